use clap::Parser;
use fft_engine::core::diagnostics::{Diagnostics, HealthStatus};
use fft_engine::core::flags::CapabilityFlag;
use fft_engine::core::runtime::RuntimeConfig;
use fft_engine::simd;
use sysinfo::System;

/// Report which instruction-set extensions this host can execute.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Print the report as JSON
    #[arg(short, long)]
    json: bool,

    /// Check a single flag; exits with status 1 if unsupported
    #[arg(short, long)]
    flag: Option<CapabilityFlag>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    if let Some(flag) = args.flag {
        let supported = fft_engine::is_supported(flag);
        println!("{flag}: {}", if supported { "supported" } else { "unsupported" });
        std::process::exit(if supported { 0 } else { 1 });
    }

    let report = Diagnostics::report();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let sys = System::new_all();
    println!("CPU: {}", sys.global_cpu_info().brand().trim());
    println!("Arch: {}", report.arch);
    println!("OS saves AVX state: {}", report.os_avx);
    println!("Disabled by config: {}", RuntimeConfig::global().disabled);
    println!();
    println!("{:<6} {:<8} {:<12} {:>6}", "FLAG", "CLAIMED", "VERDICT", "WIDTH");
    for row in &report.flags {
        println!(
            "{:<6} {:<8} {:<12} {:>6}",
            row.flag,
            row.claimed,
            format!("{:?}", row.verdict),
            row.vector_width
        );
    }
    println!();
    println!("Kernel: {}", simd::best_available());
    match &report.health {
        HealthStatus::Healthy => println!("Health: ok"),
        HealthStatus::Suspicious(details) => println!("Health: suspicious ({details})"),
    }
    Ok(())
}
