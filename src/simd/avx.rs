#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use super::{portable, Complex32};
use crate::core::alignment::SIGN_MASK_EVEN_256;

/// Pointwise complex product, four values per 256-bit register.
#[target_feature(enable = "avx", enable = "fma")]
pub unsafe fn complex_multiply_avx(a: &[Complex32], b: &[Complex32], out: &mut [Complex32]) {
    let n = a.len();
    assert_eq!(n, b.len());
    assert_eq!(n, out.len());

    let pa = bytemuck::cast_slice::<Complex32, f32>(a).as_ptr();
    let pb = bytemuck::cast_slice::<Complex32, f32>(b).as_ptr();
    let po = bytemuck::cast_slice_mut::<Complex32, f32>(out).as_mut_ptr();

    // Aligned load; validated by the capability cache.
    let mask = _mm256_load_ps(SIGN_MASK_EVEN_256.0.as_ptr());

    let mut i = 0;
    while i + 4 <= n {
        let x = _mm256_loadu_ps(pa.add(2 * i));
        let y = _mm256_loadu_ps(pb.add(2 * i));

        let y_re = _mm256_moveldup_ps(y);
        let y_im = _mm256_movehdup_ps(y);
        let x_swapped = _mm256_permute_ps::<0xB1>(x);

        // x * y_re + (x_swapped * y_im with real lanes negated)
        let cross = _mm256_xor_ps(_mm256_mul_ps(x_swapped, y_im), mask);
        _mm256_storeu_ps(po.add(2 * i), _mm256_fmadd_ps(x, y_re, cross));
        i += 4;
    }

    portable::complex_multiply(&a[i..], &b[i..], &mut out[i..]);
}
