use crate::core::cache;
use crate::core::flags::{CapabilityFlag, ProbeResult};
use crate::core::hardware::CpuFeatures;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "details", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// The processor claims an extension that did not execute.
    Suspicious(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct FlagReport {
    pub flag: CapabilityFlag,
    pub claimed: bool,
    pub verdict: ProbeResult,
    pub vector_width: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityReport {
    pub arch: &'static str,
    pub os_avx: bool,
    pub flags: Vec<FlagReport>,
    pub health: HealthStatus,
}

pub struct Diagnostics;

impl Diagnostics {
    /// Resolves every flag through the process cache and compares the
    /// verdicts with what the processor claims.
    pub fn report() -> CapabilityReport {
        let features = CpuFeatures::detect();
        let flags: Vec<FlagReport> = CapabilityFlag::ALL
            .into_iter()
            .map(|flag| {
                cache::is_supported(flag);
                FlagReport {
                    flag,
                    claimed: features.claims.contains_flag(flag),
                    verdict: cache::cached_result(flag),
                    vector_width: flag.vector_width(),
                }
            })
            .collect();

        let health = Self::check_health(&flags);
        CapabilityReport {
            arch: std::env::consts::ARCH,
            os_avx: features.os_avx,
            flags,
            health,
        }
    }

    pub fn check_health(flags: &[FlagReport]) -> HealthStatus {
        let refused: Vec<&str> = flags
            .iter()
            .filter(|r| r.claimed && r.verdict == ProbeResult::Unsupported)
            .map(|r| r.flag.name())
            .collect();

        if refused.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Suspicious(format!(
                "Claimed but not executable (virtualized or disabled?): {}",
                refused.join(", ")
            ))
        }
    }
}
