//! Process-scoped capability verdicts.
//!
//! Each flag moves `Unknown -> Supported | Unsupported` exactly once. The
//! transition is made by a single caller holding `resolving`; every other
//! caller waits on the mutex and then reads the published verdict.
use crate::core::alignment::{self, AlignmentCheck};
use crate::core::flags::{CapabilityFlag, CapabilitySet, ProbeResult};
use crate::core::hardware::{CpuidQuery, FeatureQuery};
use crate::core::probe::{SafeProbe, TrappingProbe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

#[allow(clippy::declare_interior_mutable_const)]
const UNKNOWN: AtomicU8 = AtomicU8::new(ProbeResult::Unknown as u8);

pub struct CapabilityCache<Q = CpuidQuery, P = TrappingProbe> {
    query: Q,
    probe: P,
    alignment: AlignmentCheck,
    slots: [AtomicU8; CapabilityFlag::COUNT],
    resolving: Mutex<()>,
}

static GLOBAL: CapabilityCache = CapabilityCache::new(CpuidQuery, TrappingProbe);

/// Whether the running processor can execute `flag`, resolved once per process.
pub fn is_supported(flag: CapabilityFlag) -> bool {
    GLOBAL.is_supported(flag)
}

/// Verdict for `flag` without resolving it.
pub fn cached_result(flag: CapabilityFlag) -> ProbeResult {
    GLOBAL.result(flag)
}

/// Resolves every flag and returns the supported ones.
pub fn supported_set() -> CapabilitySet {
    GLOBAL.supported_set()
}

impl<Q: FeatureQuery, P: SafeProbe> CapabilityCache<Q, P> {
    pub const fn new(query: Q, probe: P) -> Self {
        Self {
            query,
            probe,
            alignment: alignment::self_check,
            slots: [UNKNOWN; CapabilityFlag::COUNT],
            resolving: Mutex::new(()),
        }
    }

    /// Replaces the alignment self-check run on `Supported` verdicts.
    pub fn with_alignment_check(mut self, check: AlignmentCheck) -> Self {
        self.alignment = check;
        self
    }

    pub fn result(&self, flag: CapabilityFlag) -> ProbeResult {
        ProbeResult::from_raw(self.slots[flag.index()].load(Ordering::Acquire))
    }

    pub fn is_supported(&self, flag: CapabilityFlag) -> bool {
        match self.result(flag) {
            ProbeResult::Supported => true,
            ProbeResult::Unsupported => false,
            ProbeResult::Unknown => self.resolve(flag),
        }
    }

    pub fn supported_set(&self) -> CapabilitySet {
        CapabilityFlag::ALL
            .into_iter()
            .filter(|flag| self.is_supported(*flag))
            .collect()
    }

    #[cold]
    fn resolve(&self, flag: CapabilityFlag) -> bool {
        let _computing = self.resolving.lock().unwrap_or_else(PoisonError::into_inner);

        // Another caller may have finished while we waited.
        match self.result(flag) {
            ProbeResult::Supported => return true,
            ProbeResult::Unsupported => return false,
            ProbeResult::Unknown => {}
        }

        let claimed = self.query.query(flag);
        let supported = claimed && self.probe.run(flag);

        if supported {
            if let Err(e) = (self.alignment)(flag) {
                alignment::abort_on_misalignment(&e);
            }
        }

        tracing::debug!(%flag, claimed, supported, "Resolved CPU capability");
        self.slots[flag.index()].store(ProbeResult::from_verdict(supported) as u8, Ordering::Release);
        supported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alignment::AlignmentError;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    struct Claims(CapabilitySet);

    impl FeatureQuery for Claims {
        fn query(&self, flag: CapabilityFlag) -> bool {
            self.0.contains_flag(flag)
        }
    }

    /// Simulated probe that counts invocations.
    struct Executes {
        works: CapabilitySet,
        runs: AtomicUsize,
    }

    impl Executes {
        fn new(works: CapabilitySet) -> Self {
            Self { works, runs: AtomicUsize::new(0) }
        }
    }

    impl SafeProbe for Executes {
        fn run(&self, flag: CapabilityFlag) -> bool {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.works.contains_flag(flag)
        }
    }

    #[test]
    fn test_idempotent_across_interleaved_flags() {
        let cache = CapabilityCache::new(
            Claims(CapabilitySet::all()),
            Executes::new(CapabilitySet::SSE | CapabilitySet::AVX),
        );

        let first: Vec<bool> = CapabilityFlag::ALL.iter().map(|f| cache.is_supported(*f)).collect();
        for _ in 0..3 {
            for flag in CapabilityFlag::ALL.iter().rev() {
                assert_eq!(cache.is_supported(*flag), first[flag.index()]);
            }
        }
        assert_eq!(cache.probe.runs.load(Ordering::SeqCst), CapabilityFlag::COUNT);
        assert_eq!(cache.supported_set(), CapabilitySet::SSE | CapabilitySet::AVX);
    }

    #[test]
    fn test_claim_without_execution_is_unsupported() {
        let cache = CapabilityCache::new(Claims(CapabilitySet::AVX2), Executes::new(CapabilitySet::empty()));

        assert!(!cache.is_supported(CapabilityFlag::Avx2));
        assert_eq!(cache.result(CapabilityFlag::Avx2), ProbeResult::Unsupported);
    }

    #[test]
    fn test_unclaimed_flag_is_never_probed() {
        let cache = CapabilityCache::new(Claims(CapabilitySet::empty()), Executes::new(CapabilitySet::all()));

        assert!(!cache.is_supported(CapabilityFlag::Fma));
        assert_eq!(cache.probe.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_result_stays_unknown_until_asked() {
        let cache = CapabilityCache::new(Claims(CapabilitySet::all()), Executes::new(CapabilitySet::all()));

        assert_eq!(cache.result(CapabilityFlag::Sse2), ProbeResult::Unknown);
        assert!(cache.is_supported(CapabilityFlag::Sse2));
        assert_eq!(cache.result(CapabilityFlag::Sse2), ProbeResult::Supported);
        assert_eq!(cache.result(CapabilityFlag::Sse), ProbeResult::Unknown);
    }

    #[test]
    fn test_concurrent_first_use_probes_once() {
        let threads = 8;
        let cache = CapabilityCache::new(Claims(CapabilitySet::all()), Executes::new(CapabilitySet::FMA));
        let barrier = Barrier::new(threads);

        let verdicts: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.is_supported(CapabilityFlag::Fma)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(verdicts.iter().all(|v| *v));
        assert_eq!(cache.probe.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_alignment_check_runs_only_for_supported() {
        static CHECKS: AtomicUsize = AtomicUsize::new(0);
        fn counting(_flag: CapabilityFlag) -> Result<(), AlignmentError> {
            CHECKS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        let cache = CapabilityCache::new(Claims(CapabilitySet::all()), Executes::new(CapabilitySet::SSE2))
            .with_alignment_check(counting);

        cache.is_supported(CapabilityFlag::Sse);
        cache.is_supported(CapabilityFlag::Sse2);
        cache.is_supported(CapabilityFlag::Sse2);
        assert_eq!(CHECKS.load(Ordering::SeqCst), 1);
    }

    #[cfg(fault_trap)]
    #[test]
    fn test_over_reported_feature_does_not_crash() {
        use crate::core::probe::{execute_guarded, Instruction};
        use crate::core::trap::{self, Outcome};

        // Real trap, instruction guaranteed to fault.
        struct Faults;
        impl SafeProbe for Faults {
            fn run(&self, _flag: CapabilityFlag) -> bool {
                let mut lock = trap::lock();
                execute_guarded(&mut lock, Instruction::Undefined) == Some(Outcome::Completed)
            }
        }

        let cache = CapabilityCache::new(Claims(CapabilitySet::all()), Faults);
        for flag in CapabilityFlag::ALL {
            assert!(!cache.is_supported(flag));
        }
        assert_eq!(cache.supported_set(), CapabilitySet::empty());
    }

    #[test]
    fn test_global_cache_matches_claims() {
        let claims = crate::core::hardware::CpuFeatures::detect().claims;
        for flag in CapabilityFlag::ALL {
            let supported = is_supported(flag);
            assert_eq!(cached_result(flag), ProbeResult::from_verdict(supported));
            // A verdict never exceeds the hardware's own claim.
            if supported {
                assert!(claims.contains_flag(flag));
            }
        }
        #[cfg(all(fault_trap, target_arch = "x86_64"))]
        assert!(supported_set().contains(CapabilitySet::SSE | CapabilitySet::SSE2));
    }

    const MISALIGNED_CHILD: &str = "FFT_ENGINE_TEST_MISALIGNED_CHILD";

    fn always_misaligned(flag: CapabilityFlag) -> Result<(), AlignmentError> {
        Err(AlignmentError {
            flag,
            check: "injected sign mask",
            required: 32,
            found: 0x1004,
        })
    }

    /// Runs only inside the child spawned by `test_misalignment_aborts_process`.
    #[test]
    fn misaligned_child_process() {
        if std::env::var_os(MISALIGNED_CHILD).is_none() {
            return;
        }
        let cache = CapabilityCache::new(Claims(CapabilitySet::all()), Executes::new(CapabilitySet::all()))
            .with_alignment_check(always_misaligned);
        cache.is_supported(CapabilityFlag::Avx);
        println!("unreachable: verdict returned after failed alignment check");
    }

    #[test]
    fn test_misalignment_aborts_process() {
        let exe = std::env::current_exe().unwrap();
        let output = std::process::Command::new(exe)
            .args(["--exact", "core::cache::tests::misaligned_child_process", "--nocapture", "--test-threads=1"])
            .env(MISALIGNED_CHILD, "1")
            .output()
            .unwrap();

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(!output.status.success());
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            assert_eq!(output.status.signal(), Some(libc::SIGABRT));
        }
        assert!(
            stderr.contains("fft_engine: fatal: alignment self-check failed for avx: injected sign mask"),
            "stderr: {stderr}"
        );
        assert!(!stdout.contains("unreachable"));
    }
}
