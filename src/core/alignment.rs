//! Alignment contract of the specialized kernels.
//!
//! Kernels load their constants with aligned vector loads and never check the
//! address themselves. The self-check runs once per flag, when the capability
//! cache first resolves it as supported.
use crate::core::flags::CapabilityFlag;
use crate::simd::Complex32;
use std::mem::{align_of, size_of};
use thiserror::Error;

#[repr(C, align(16))]
#[derive(Debug, Clone, Copy)]
pub struct Align16<T>(pub T);

#[repr(C, align(32))]
#[derive(Debug, Clone, Copy)]
pub struct Align32<T>(pub T);

/// Negates the real lane of each interleaved complex pair (`-0.0` flips the
/// sign bit under xor).
pub static SIGN_MASK_EVEN_128: Align16<[f32; 4]> = Align16([-0.0, 0.0, -0.0, 0.0]);
pub static SIGN_MASK_EVEN_256: Align32<[f32; 8]> =
    Align32([-0.0, 0.0, -0.0, 0.0, -0.0, 0.0, -0.0, 0.0]);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{check} requires {required}-byte alignment, found {found:#x}")]
pub struct AlignmentError {
    pub flag: CapabilityFlag,
    pub check: &'static str,
    pub required: usize,
    /// Offending address, or the type's alignment for layout checks.
    pub found: usize,
}

pub type AlignmentCheck = fn(CapabilityFlag) -> Result<(), AlignmentError>;

fn expect_aligned(
    flag: CapabilityFlag,
    check: &'static str,
    found: usize,
    required: usize,
) -> Result<(), AlignmentError> {
    if found % required == 0 {
        Ok(())
    } else {
        Err(AlignmentError { flag, check, required, found })
    }
}

/// Verifies the data the kernels gated by `flag` will load from.
pub fn self_check(flag: CapabilityFlag) -> Result<(), AlignmentError> {
    let width = flag.vector_width();

    expect_aligned(flag, "complex element size", width, size_of::<Complex32>())?;

    expect_aligned(flag, "Align16 layout", align_of::<Align16<[f32; 4]>>(), 16)?;
    expect_aligned(flag, "128-bit sign mask", SIGN_MASK_EVEN_128.0.as_ptr() as usize, 16)?;
    let stack = Align16([0.0f32; 4]);
    expect_aligned(flag, "stack vector", stack.0.as_ptr() as usize, 16)?;

    if width >= 32 {
        expect_aligned(flag, "Align32 layout", align_of::<Align32<[f32; 8]>>(), 32)?;
        expect_aligned(flag, "256-bit sign mask", SIGN_MASK_EVEN_256.0.as_ptr() as usize, 32)?;
        let stack = Align32([0.0f32; 8]);
        expect_aligned(flag, "stack vector", stack.0.as_ptr() as usize, 32)?;
        let heap = Box::new(Align32([0.0f32; 8]));
        expect_aligned(flag, "heap vector", heap.0.as_ptr() as usize, 32)?;
    } else {
        let heap = Box::new(Align16([0.0f32; 4]));
        expect_aligned(flag, "heap vector", heap.0.as_ptr() as usize, 16)?;
    }

    Ok(())
}

/// A supported extension whose kernels would read misaligned data is a build
/// defect; continuing would corrupt results, so the process stops here.
pub fn abort_on_misalignment(err: &AlignmentError) -> ! {
    tracing::error!(flag = %err.flag, check = err.check, required = err.required, "Alignment self-check failed");
    eprintln!(
        "fft_engine: fatal: alignment self-check failed for {}: {}",
        err.flag, err
    );
    std::process::abort()
}
