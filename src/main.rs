use fft_engine::api::{self, wisdom, PlannerFlags, R2rKind, Sign};
use fft_engine::core::cache;
use fft_engine::core::flags::CapabilityFlag;
use fft_engine::simd::{self, Complex32};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== FFT Engine Demo ===");

    // 1. Capabilities
    println!("\n[1] Probing instruction-set extensions...");
    for flag in CapabilityFlag::ALL {
        println!("    {:<5} {}", flag, if cache::is_supported(flag) { "yes" } else { "no" });
    }
    println!("    Supported set: {}", cache::supported_set());

    // 2. Kernel
    let kernel = simd::best_available();
    println!("\n[2] Selected complex kernel: {kernel}");

    let a: Vec<Complex32> = (0..8).map(|i| Complex32::new(i as f32, 1.0)).collect();
    let b = vec![Complex32::new(0.0, 1.0); a.len()];
    let mut out = vec![Complex32::default(); a.len()];
    simd::complex_multiply(&a, &b, &mut out);
    println!("    (i + 1j) * 1j for i in 0..8:");
    for (x, y) in a.iter().zip(&out) {
        println!("    - ({:>4.1}, {:>4.1}) -> ({:>5.1}, {:>4.1})", x.re, x.im, y.re, y.im);
    }

    // 3. Plans
    println!("\n[3] Planning...");
    let forward = api::plan_dft(&[64, 64], Sign::Forward, PlannerFlags::ESTIMATE)?;
    let again = api::plan_dft(&[64, 64], Sign::Forward, PlannerFlags::ESTIMATE)?;
    let cosine = api::plan_r2r(&[128], &[R2rKind::Redft10], PlannerFlags::UNALIGNED)?;
    println!("    {forward}");
    println!("    {again}");
    println!("    {cosine}");

    // 4. Wisdom
    println!("\n[4] Exported wisdom:");
    println!("{}", wisdom::global().export_to_string());

    println!("\n=== Demo Complete ===");
    Ok(())
}
