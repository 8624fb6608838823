#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod avx;
#[cfg(target_arch = "aarch64")]
pub mod neon;
pub mod portable;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod sse;

use crate::api::PlannerFlags;
use crate::core::cache::is_supported;
use crate::core::flags::CapabilityFlag;
use crate::core::runtime::RuntimeConfig;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Interleaved single-precision complex value.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Complex32 {
    pub re: f32,
    pub im: f32,
}

impl Complex32 {
    pub const fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }
}

/// Pointwise product `out[i] = a[i] * b[i]`. All slices must have equal length.
pub type ComplexMulFunc = unsafe fn(&[Complex32], &[Complex32], &mut [Complex32]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelPath {
    Portable,
    Sse,
    Avx,
    Neon,
}

impl KernelPath {
    /// Most specialized first.
    pub const PREFERENCE: [KernelPath; 4] = [KernelPath::Avx, KernelPath::Sse, KernelPath::Neon, KernelPath::Portable];

    pub fn required_flags(self) -> &'static [CapabilityFlag] {
        match self {
            KernelPath::Portable => &[],
            KernelPath::Sse => &[CapabilityFlag::Sse],
            KernelPath::Avx => &[CapabilityFlag::Avx, CapabilityFlag::Fma],
            KernelPath::Neon => &[CapabilityFlag::Neon],
        }
    }

    /// Every required flag is supported by the processor and allowed by
    /// configuration.
    pub fn usable(self) -> bool {
        let config = RuntimeConfig::global();
        self.required_flags()
            .iter()
            .all(|flag| config.allows(*flag) && is_supported(*flag))
    }

    pub fn name(self) -> &'static str {
        match self {
            KernelPath::Portable => "portable",
            KernelPath::Sse => "sse",
            KernelPath::Avx => "avx",
            KernelPath::Neon => "neon",
        }
    }
}

impl fmt::Display for KernelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

static SELECTED: OnceLock<KernelPath> = OnceLock::new();

/// Most specialized usable path, decided once per process.
pub fn best_available() -> KernelPath {
    *SELECTED.get_or_init(|| {
        let path = KernelPath::PREFERENCE
            .into_iter()
            .find(|path| path.usable())
            .unwrap_or(KernelPath::Portable);
        tracing::debug!(kernel = %path, "Selected complex kernel");
        path
    })
}

/// Path for a plan created with `flags`.
///
/// Specialized kernels assume the alignment validated when their flags were
/// resolved; callers that cannot promise aligned buffers opt out.
pub fn select_kernel(flags: PlannerFlags) -> KernelPath {
    if flags.intersects(PlannerFlags::UNALIGNED | PlannerFlags::NO_SIMD) {
        return KernelPath::Portable;
    }
    best_available()
}

/// Kernel for `path`, falling back to the portable one when the path is not
/// usable on this host.
pub fn kernel_for(path: KernelPath) -> ComplexMulFunc {
    if !path.usable() {
        return wrapper_scalar;
    }
    match path {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        KernelPath::Sse => sse::complex_multiply_sse,
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        KernelPath::Avx => avx::complex_multiply_avx,
        #[cfg(target_arch = "aarch64")]
        KernelPath::Neon => neon::complex_multiply_neon,
        _ => wrapper_scalar,
    }
}

pub fn get_complex_multiply() -> ComplexMulFunc {
    kernel_for(best_available())
}

/// Pointwise complex product through the best available kernel.
pub fn complex_multiply(a: &[Complex32], b: &[Complex32], out: &mut [Complex32]) {
    assert_eq!(a.len(), b.len());
    assert_eq!(a.len(), out.len());
    let kernel = get_complex_multiply();
    unsafe { kernel(a, b, out) }
}

unsafe fn wrapper_scalar(a: &[Complex32], b: &[Complex32], out: &mut [Complex32]) {
    portable::complex_multiply(a, b, out)
}
