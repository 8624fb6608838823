//! Empirical capability probe.
//!
//! Executes exactly one instance of an extension's instruction under a
//! [`FaultTrap`](crate::core::trap). The inline assembly below is the only
//! instruction-set-specific code in the engine.
use crate::core::flags::CapabilityFlag;
use crate::core::trap::{self, Outcome};

pub trait SafeProbe {
    /// Whether one instance of the instruction for `flag` executes.
    fn run(&self, flag: CapabilityFlag) -> bool;
}

/// Probe backed by the process `SIGILL` trap.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrappingProbe;

impl SafeProbe for TrappingProbe {
    fn run(&self, flag: CapabilityFlag) -> bool {
        match Instruction::for_flag(flag) {
            Some(instruction) => {
                let mut lock = trap::lock();
                execute_guarded(&mut lock, instruction) == Some(Outcome::Completed)
            }
            None => false,
        }
    }
}

/// The single instruction executed for a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Instruction {
    /// `xorps xmm0, xmm0`
    Xorps,
    /// `xorpd xmm0, xmm0`
    Xorpd,
    /// `vxorps ymm0, ymm0, ymm0`
    Vxorps,
    /// `vpxor ymm0, ymm0, ymm0`
    Vpxor,
    /// `vfmadd231ps xmm0, xmm0, xmm0`
    Vfmadd231ps,
    /// `movi v0.16b, #0`
    Movi,
    /// Architecturally undefined; always faults.
    #[cfg(test)]
    Undefined,
}

impl Instruction {
    pub(crate) fn for_flag(flag: CapabilityFlag) -> Option<Self> {
        let instruction = match flag {
            CapabilityFlag::Sse => Instruction::Xorps,
            CapabilityFlag::Sse2 => Instruction::Xorpd,
            CapabilityFlag::Avx => Instruction::Vxorps,
            CapabilityFlag::Avx2 => Instruction::Vpxor,
            CapabilityFlag::Fma => Instruction::Vfmadd231ps,
            CapabilityFlag::Neon => Instruction::Movi,
        };
        instruction.native().then_some(instruction)
    }

    /// Whether the encoding belongs to the architecture we run on.
    fn native(self) -> bool {
        match self {
            Instruction::Movi => cfg!(target_arch = "aarch64"),
            #[cfg(test)]
            Instruction::Undefined => true,
            _ => cfg!(target_arch = "x86_64"),
        }
    }
}

/// Arms a trap, executes `instruction` once, and disarms.
///
/// Returns `None` when no trap could be armed; callers must then treat the
/// extension as unusable rather than execute it unguarded.
pub(crate) fn execute_guarded(lock: &mut trap::TrapLock, instruction: Instruction) -> Option<Outcome> {
    #[cfg(fault_trap)]
    {
        if !instruction.native() {
            return None;
        }
        let trap = match trap::FaultTrap::arm(lock) {
            Ok(trap) => trap,
            Err(e) => {
                tracing::warn!(error = %e, ?instruction, "Fault trap unavailable, skipping probe");
                return None;
            }
        };
        let completed = unsafe { asm_probe::execute(instruction) };
        drop(trap);
        Some(if completed { Outcome::Completed } else { Outcome::Faulted })
    }

    #[cfg(not(fault_trap))]
    {
        let _ = lock;
        tracing::warn!(?instruction, error = %trap::TrapError::Unavailable, "Skipping probe");
        None
    }
}

/// Register holding the resume address while a probe instruction executes.
#[cfg(all(fault_trap, target_arch = "aarch64"))]
pub(crate) const RESUME_REGISTER: usize = 9;

#[cfg(all(fault_trap, target_arch = "x86_64"))]
mod asm_probe {
    use super::Instruction;
    use std::arch::asm;

    // RCX receives the address of the label past the instruction. On a fault
    // the trap handler moves it into RIP, skipping the `mov` that marks
    // completion in EAX.
    macro_rules! guarded {
        ($encoding:literal) => {{
            let mut completed: u32 = 0;
            asm!(
                "lea rcx, [rip + 2f]",
                $encoding,
                "mov eax, 1",
                "2:",
                inout("eax") completed,
                out("rcx") _,
                clobber_abi("C"),
                options(nostack),
            );
            completed != 0
        }};
    }

    /// # Safety
    /// A fault trap must be armed on the calling thread.
    pub(super) unsafe fn execute(instruction: Instruction) -> bool {
        match instruction {
            Instruction::Xorps => guarded!(".byte 0x0f, 0x57, 0xc0"),
            Instruction::Xorpd => guarded!(".byte 0x66, 0x0f, 0x57, 0xc0"),
            // AVX-family probes end with vzeroupper (c5 f8 77).
            Instruction::Vxorps => guarded!(".byte 0xc5, 0xfc, 0x57, 0xc0, 0xc5, 0xf8, 0x77"),
            Instruction::Vpxor => guarded!(".byte 0xc5, 0xfd, 0xef, 0xc0, 0xc5, 0xf8, 0x77"),
            Instruction::Vfmadd231ps => guarded!(".byte 0xc4, 0xe2, 0x79, 0xb8, 0xc0, 0xc5, 0xf8, 0x77"),
            Instruction::Movi => false,
            // ud2
            #[cfg(test)]
            Instruction::Undefined => guarded!(".byte 0x0f, 0x0b"),
        }
    }
}

#[cfg(all(fault_trap, target_arch = "aarch64"))]
mod asm_probe {
    use super::Instruction;
    use std::arch::asm;

    // X9 (RESUME_REGISTER) receives the address of the label past the
    // instruction; the trap handler moves it into PC on a fault. W10 marks
    // completion.
    macro_rules! guarded {
        ($encoding:literal) => {{
            let mut completed: u32 = 0;
            asm!(
                "adr x9, 2f",
                $encoding,
                "mov w10, #1",
                "2:",
                inout("w10") completed,
                out("x9") _,
                clobber_abi("C"),
                options(nostack),
            );
            completed != 0
        }};
    }

    /// # Safety
    /// A fault trap must be armed on the calling thread.
    pub(super) unsafe fn execute(instruction: Instruction) -> bool {
        match instruction {
            Instruction::Movi => guarded!(".inst 0x4f00e400"),
            // udf #0
            #[cfg(test)]
            Instruction::Undefined => guarded!(".inst 0x00000000"),
            _ => false,
        }
    }
}
