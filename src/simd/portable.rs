use super::Complex32;

pub fn complex_multiply(a: &[Complex32], b: &[Complex32], out: &mut [Complex32]) {
    assert_eq!(a.len(), b.len());
    assert_eq!(a.len(), out.len());
    for ((x, y), o) in a.iter().zip(b.iter()).zip(out.iter_mut()) {
        *o = Complex32 {
            re: x.re * y.re - x.im * y.im,
            im: x.re * y.im + x.im * y.re,
        };
    }
}
