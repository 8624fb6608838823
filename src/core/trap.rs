//! Fault trap around the process-wide `SIGILL` disposition.
//!
//! A [`FaultTrap`] installs a handler that, while a probe is armed on the
//! current thread, redirects the faulting context to the resume label the
//! probe captured and lets the probe observe [`Outcome::Faulted`]. Dropping the
//! trap restores the disposition that was in force before it was armed.
//!
//! All traps are serialized through [`TrapLock`]: two concurrent probes would
//! each save and restore the disposition, and an interleaving could leave the
//! handler installed or attribute one probe's fault to the other.

use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrapError {
    #[error("Failed to install SIGILL handler: {0}")]
    Install(#[source] std::io::Error),
    #[error("Failed to read SIGILL disposition: {0}")]
    Query(#[source] std::io::Error),
    #[error("No fault trap available on this target")]
    Unavailable,
}

/// How control left the probed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Faulted,
}

static TRAP_LOCK: Mutex<()> = Mutex::new(());

/// Exclusive right to arm a fault trap.
pub struct TrapLock {
    _guard: MutexGuard<'static, ()>,
}

/// Blocks until no other probe holds the disposition.
pub fn lock() -> TrapLock {
    TrapLock {
        _guard: TRAP_LOCK.lock().unwrap_or_else(PoisonError::into_inner),
    }
}

#[cfg(fault_trap)]
pub use imp::{Disposition, FaultTrap};

#[cfg(fault_trap)]
mod imp {
    use super::{TrapError, TrapLock};
    use libc::{c_int, c_void, sigaction, siginfo_t};
    use std::cell::UnsafeCell;
    use std::io;
    use std::mem::{self, MaybeUninit};
    use std::ptr;
    use std::sync::atomic::{AtomicI64, Ordering};

    // Thread id of the armed probe; 0 when disarmed.
    static ARMED_TID: AtomicI64 = AtomicI64::new(0);

    // Disposition replaced by the armed trap. Written under the trap lock
    // before the handler is installed; read only by the handler.
    struct SavedAction(UnsafeCell<MaybeUninit<sigaction>>);
    unsafe impl Sync for SavedAction {}
    static PREVIOUS: SavedAction = SavedAction(UnsafeCell::new(MaybeUninit::uninit()));

    // glibc ORs SA_RESTORER into every disposition it installs; it is not part
    // of what the caller configured.
    const SA_RESTORER: c_int = 0x0400_0000;

    fn current_tid() -> i64 {
        unsafe { libc::syscall(libc::SYS_gettid) as i64 }
    }

    /// Caller-visible disposition of a signal. `mask` has bit `n - 1` set for
    /// each blocked signal `n`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Disposition {
        pub handler: libc::sighandler_t,
        pub flags: c_int,
        pub mask: u64,
    }

    impl Disposition {
        pub fn current(signal: c_int) -> Result<Self, TrapError> {
            let raw = read_action(signal).map_err(TrapError::Query)?;
            Ok(Self::from_action(&raw))
        }

        pub(crate) fn from_action(action: &sigaction) -> Self {
            Self {
                handler: action.sa_sigaction,
                flags: action.sa_flags & !SA_RESTORER,
                mask: signal_bits(&action.sa_mask),
            }
        }
    }

    // The C library's sigset_t is wider than the kernel's; only the members
    // are meaningful, the padding past them is whatever was on the stack.
    fn signal_bits(set: &libc::sigset_t) -> u64 {
        let highest = libc::SIGRTMAX().min(64);
        (1..=highest)
            .filter(|&signal| unsafe { libc::sigismember(set, signal) } == 1)
            .fold(0, |bits, signal| bits | 1 << (signal - 1))
    }

    fn read_action(signal: c_int) -> io::Result<sigaction> {
        let mut current = MaybeUninit::<sigaction>::zeroed();
        let rc = unsafe { libc::sigaction(signal, ptr::null(), current.as_mut_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(unsafe { current.assume_init() })
    }

    /// Armed `SIGILL` trap. The previous disposition is restored on drop.
    pub struct FaultTrap<'lock> {
        previous: sigaction,
        _lock: &'lock mut TrapLock,
    }

    impl<'lock> FaultTrap<'lock> {
        pub fn arm(lock: &'lock mut TrapLock) -> Result<Self, TrapError> {
            let mut action: sigaction = unsafe { MaybeUninit::zeroed().assume_init() };
            action.sa_sigaction = on_illegal_instruction as usize;
            action.sa_flags = libc::SA_SIGINFO;
            unsafe { libc::sigemptyset(&mut action.sa_mask) };

            let previous = read_action(libc::SIGILL).map_err(TrapError::Query)?;
            unsafe { (*PREVIOUS.0.get()).write(previous) };

            let rc = unsafe { libc::sigaction(libc::SIGILL, &action, ptr::null_mut()) };
            if rc != 0 {
                return Err(TrapError::Install(io::Error::last_os_error()));
            }

            ARMED_TID.store(current_tid(), Ordering::SeqCst);
            Ok(Self { previous, _lock: lock })
        }
    }

    impl Drop for FaultTrap<'_> {
        fn drop(&mut self) {
            ARMED_TID.store(0, Ordering::SeqCst);
            let rc = unsafe { libc::sigaction(libc::SIGILL, &self.previous, ptr::null_mut()) };
            if rc != 0 {
                tracing::error!(
                    error = %io::Error::last_os_error(),
                    "Failed to restore SIGILL disposition"
                );
            }
        }
    }

    extern "C" fn on_illegal_instruction(signal: c_int, info: *mut siginfo_t, context: *mut c_void) {
        if ARMED_TID.load(Ordering::SeqCst) != current_tid() {
            unsafe { forward_to_previous(signal, info, context) };
            return;
        }
        unsafe { resume_after_probe(context.cast()) };
    }

    /// Hands a fault raised outside the probe to the disposition the trap
    /// replaced. Default and ignored dispositions are reinstated as the
    /// default action, so a real fault re-executes and terminates as usual.
    unsafe fn forward_to_previous(signal: c_int, info: *mut siginfo_t, context: *mut c_void) {
        let previous = (*PREVIOUS.0.get()).assume_init_ref();
        match previous.sa_sigaction {
            libc::SIG_DFL | libc::SIG_IGN => {
                libc::signal(libc::SIGILL, libc::SIG_DFL);
            }
            handler if previous.sa_flags & libc::SA_SIGINFO != 0 => {
                let handler: extern "C" fn(c_int, *mut siginfo_t, *mut c_void) = mem::transmute(handler);
                handler(signal, info, context);
            }
            handler => {
                let handler: extern "C" fn(c_int) = mem::transmute(handler);
                handler(signal);
            }
        }
    }

    /// Jumps past the probed instruction to the label whose address the probe
    /// left in its resume register. The instruction is never retried.
    #[cfg(target_arch = "x86_64")]
    unsafe fn resume_after_probe(context: *mut libc::ucontext_t) {
        let gregs = &mut (*context).uc_mcontext.gregs;
        gregs[libc::REG_RIP as usize] = gregs[libc::REG_RCX as usize];
    }

    #[cfg(target_arch = "aarch64")]
    unsafe fn resume_after_probe(context: *mut libc::ucontext_t) {
        let mcontext = &mut (*context).uc_mcontext;
        mcontext.pc = mcontext.regs[crate::core::probe::RESUME_REGISTER];
    }
}
