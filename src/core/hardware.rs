//! Hardware Detection Module
//! Asks the processor which instruction-set extensions it claims.
//!
//! A claim is necessary but not sufficient: hypervisors and emulators can
//! report a feature that does not execute. `core::probe` confirms it.
use crate::core::flags::{CapabilityFlag, CapabilitySet};

pub trait FeatureQuery {
    /// Whether the processor's identification mechanism reports `flag`.
    fn query(&self, flag: CapabilityFlag) -> bool;
}

/// `cpuid`-backed query on x86; runtime detection on aarch64.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuidQuery;

impl FeatureQuery for CpuidQuery {
    fn query(&self, flag: CapabilityFlag) -> bool {
        CpuFeatures::detect().claims.contains_flag(flag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuFeatures {
    pub claims: CapabilitySet,
    /// OS saves YMM state on context switch (OSXSAVE + XCR0).
    pub os_avx: bool,
}

impl CpuFeatures {
    pub fn detect() -> Self {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            x86::detect()
        }

        #[cfg(target_arch = "aarch64")]
        {
            let mut claims = CapabilitySet::empty();
            if std::arch::is_aarch64_feature_detected!("neon") {
                claims |= CapabilitySet::NEON;
            }
            Self { claims, os_avx: false }
        }

        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
        {
            Self {
                claims: CapabilitySet::empty(),
                os_avx: false,
            }
        }
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod x86 {
    use super::CpuFeatures;
    use crate::core::flags::CapabilitySet;

    #[cfg(target_arch = "x86")]
    use std::arch::x86::{__cpuid, __cpuid_count, __get_cpuid_max, _xgetbv};
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64::{__cpuid, __cpuid_count, __get_cpuid_max, _xgetbv};

    const EDX_SSE: u32 = 1 << 25;
    const EDX_SSE2: u32 = 1 << 26;
    const ECX_FMA: u32 = 1 << 12;
    const ECX_OSXSAVE: u32 = 1 << 27;
    const ECX_AVX: u32 = 1 << 28;
    const EBX7_AVX2: u32 = 1 << 5;
    // XMM (bit 1) and YMM (bit 2) state enabled by the OS.
    const XCR0_AVX_STATE: u64 = 0b110;

    pub(super) fn detect() -> CpuFeatures {
        // RBX is reserved by LLVM; the intrinsic saves and restores it around
        // the instruction, which a hand-written `asm!` would have to do.
        let (max_leaf, _) = unsafe { __get_cpuid_max(0) };
        if max_leaf < 1 {
            return CpuFeatures {
                claims: CapabilitySet::empty(),
                os_avx: false,
            };
        }

        let leaf1 = unsafe { __cpuid(1) };
        let os_avx = leaf1.ecx & ECX_OSXSAVE != 0
            && unsafe { read_xcr0() } & XCR0_AVX_STATE == XCR0_AVX_STATE;

        let mut claims = CapabilitySet::empty();
        if leaf1.edx & EDX_SSE != 0 {
            claims |= CapabilitySet::SSE;
        }
        if leaf1.edx & EDX_SSE2 != 0 {
            claims |= CapabilitySet::SSE2;
        }
        if os_avx && leaf1.ecx & ECX_AVX != 0 {
            claims |= CapabilitySet::AVX;
        }
        if os_avx && leaf1.ecx & ECX_FMA != 0 {
            claims |= CapabilitySet::FMA;
        }
        if os_avx && max_leaf >= 7 {
            let leaf7 = unsafe { __cpuid_count(7, 0) };
            if leaf7.ebx & EBX7_AVX2 != 0 {
                claims |= CapabilitySet::AVX2;
            }
        }

        CpuFeatures { claims, os_avx }
    }

    /// Only valid once OSXSAVE has been observed.
    #[target_feature(enable = "xsave")]
    unsafe fn read_xcr0() -> u64 {
        _xgetbv(0)
    }
}
