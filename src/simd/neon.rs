use std::arch::aarch64::*;

use super::{portable, Complex32};

/// Pointwise complex product, four values per iteration. `vld2q` splits the
/// interleaved pairs into real and imaginary registers.
#[target_feature(enable = "neon")]
pub unsafe fn complex_multiply_neon(a: &[Complex32], b: &[Complex32], out: &mut [Complex32]) {
    let n = a.len();
    assert_eq!(n, b.len());
    assert_eq!(n, out.len());

    let pa = bytemuck::cast_slice::<Complex32, f32>(a).as_ptr();
    let pb = bytemuck::cast_slice::<Complex32, f32>(b).as_ptr();
    let po = bytemuck::cast_slice_mut::<Complex32, f32>(out).as_mut_ptr();

    let mut i = 0;
    while i + 4 <= n {
        let x = vld2q_f32(pa.add(2 * i));
        let y = vld2q_f32(pb.add(2 * i));

        let re = vmlsq_f32(vmulq_f32(x.0, y.0), x.1, y.1);
        let im = vmlaq_f32(vmulq_f32(x.0, y.1), x.1, y.0);
        vst2q_f32(po.add(2 * i), float32x4x2_t(re, im));
        i += 4;
    }

    portable::complex_multiply(&a[i..], &b[i..], &mut out[i..]);
}
