#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use super::{portable, Complex32};
use crate::core::alignment::SIGN_MASK_EVEN_128;

/// Pointwise complex product, two values per 128-bit register.
///
/// (a + bi)(c + di): multiply by the duplicated real parts of `y`, add the
/// pair-swapped `x` times the duplicated imaginary parts with the real lane
/// negated through the sign mask.
#[target_feature(enable = "sse")]
pub unsafe fn complex_multiply_sse(a: &[Complex32], b: &[Complex32], out: &mut [Complex32]) {
    let n = a.len();
    assert_eq!(n, b.len());
    assert_eq!(n, out.len());

    let pa = bytemuck::cast_slice::<Complex32, f32>(a).as_ptr();
    let pb = bytemuck::cast_slice::<Complex32, f32>(b).as_ptr();
    let po = bytemuck::cast_slice_mut::<Complex32, f32>(out).as_mut_ptr();

    // Aligned load; validated by the capability cache.
    let mask = _mm_load_ps(SIGN_MASK_EVEN_128.0.as_ptr());

    let mut i = 0;
    while i + 2 <= n {
        let x = _mm_loadu_ps(pa.add(2 * i));
        let y = _mm_loadu_ps(pb.add(2 * i));

        let y_re = _mm_shuffle_ps::<0xA0>(y, y); // [c0, c0, c1, c1]
        let y_im = _mm_shuffle_ps::<0xF5>(y, y); // [d0, d0, d1, d1]
        let x_swapped = _mm_shuffle_ps::<0xB1>(x, x); // [b0, a0, b1, a1]

        let cross = _mm_xor_ps(_mm_mul_ps(x_swapped, y_im), mask);
        _mm_storeu_ps(po.add(2 * i), _mm_add_ps(_mm_mul_ps(x, y_re), cross));
        i += 2;
    }

    portable::complex_multiply(&a[i..], &b[i..], &mut out[i..]);
}
