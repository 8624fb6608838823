use clap::Parser;
use fft_engine::core::cache;
use fft_engine::core::flags::CapabilityFlag;
use fft_engine::simd::{self, Complex32, KernelPath};
use hdrhistogram::Histogram;
use rand::Rng;
use rayon::prelude::*;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, about, long_about = None)]
struct Args {
    /// Cached lookups timed per flag
    #[arg(short, long, default_value_t = 100_000)]
    lookups: usize,

    /// Complex values per kernel call
    #[arg(short, long, default_value_t = 4096)]
    size: usize,

    /// Kernel calls per path
    #[arg(short, long, default_value_t = 2_000)]
    rounds: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    println!("=== Benchmark: lookups={}, size={}, rounds={} ===", args.lookups, args.size, args.rounds);

    // 1. First use from every core at once
    println!("\nResolving capabilities from {} threads...", rayon::current_num_threads());
    let start = Instant::now();
    let agreed = (0..rayon::current_num_threads() * 64)
        .into_par_iter()
        .map(|i| {
            let flag = CapabilityFlag::ALL[i % CapabilityFlag::COUNT];
            (flag, cache::is_supported(flag))
        })
        .collect::<Vec<_>>()
        .into_iter()
        .all(|(flag, verdict)| verdict == cache::is_supported(flag));
    println!("First-use resolution: {:.2?} (consistent: {agreed})", start.elapsed());
    println!("Supported: {}", cache::supported_set());

    // 2. Cached lookup latency
    println!("\nTiming cached lookups...");
    let mut hist = Histogram::<u64>::new(3)?;
    for flag in CapabilityFlag::ALL {
        for _ in 0..args.lookups {
            let t = Instant::now();
            std::hint::black_box(cache::is_supported(std::hint::black_box(flag)));
            hist.saturating_record(t.elapsed().as_nanos() as u64);
        }
    }
    println!(
        "Lookup ns: p50={} p95={} p99={} max={}",
        hist.value_at_quantile(0.5),
        hist.value_at_quantile(0.95),
        hist.value_at_quantile(0.99),
        hist.max()
    );

    // 3. Kernel throughput
    println!("\nBenchmarking complex multiply...");
    let mut rng = rand::thread_rng();
    let a: Vec<Complex32> = (0..args.size).map(|_| Complex32::new(rng.gen(), rng.gen())).collect();
    let b: Vec<Complex32> = (0..args.size).map(|_| Complex32::new(rng.gen(), rng.gen())).collect();
    let mut out = vec![Complex32::default(); args.size];

    let selected = simd::best_available();
    let mut paths = vec![KernelPath::Portable];
    if selected != KernelPath::Portable {
        paths.push(selected);
    }
    for path in paths {
        let kernel = simd::kernel_for(path);
        let start = Instant::now();
        for _ in 0..args.rounds {
            unsafe { kernel(&a, &b, &mut out) };
            std::hint::black_box(&mut out);
        }
        let duration = start.elapsed();
        let per_second = (args.rounds * args.size) as f64 / duration.as_secs_f64();
        println!("{path:<9} {duration:>10.2?}  {:.2} M products/s", per_second / 1e6);
    }
    Ok(())
}
