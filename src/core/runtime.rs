use crate::core::flags::{CapabilityFlag, CapabilitySet, UnknownFlag};
use std::sync::OnceLock;
use thiserror::Error;

/// Comma-separated flag names, or `all`, that kernel selection must not use.
pub const DISABLE_ENV: &str = "FFT_ENGINE_DISABLE";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid FFT_ENGINE_DISABLE entry: {0}")]
    UnknownFlag(#[from] UnknownFlag),
}

/// Process configuration for kernel dispatch.
///
/// Disabling a flag hides it from kernel selection only; the capability
/// cache keeps reporting what the hardware can do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub disabled: CapabilitySet,
}

static GLOBAL: OnceLock<RuntimeConfig> = OnceLock::new();

impl RuntimeConfig {
    /// Loaded from the environment on first use.
    pub fn global() -> &'static RuntimeConfig {
        GLOBAL.get_or_init(|| {
            Self::from_env().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring dispatch configuration");
                Self::default()
            })
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(DISABLE_ENV) {
            Ok(value) => Self::parse_disabled(&value),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn parse_disabled(value: &str) -> Result<Self, ConfigError> {
        if value.trim().eq_ignore_ascii_case("all") {
            return Ok(Self { disabled: CapabilitySet::all() });
        }

        let mut disabled = CapabilitySet::empty();
        for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            disabled |= name.parse::<CapabilityFlag>()?.bit();
        }
        Ok(Self { disabled })
    }

    pub fn allows(&self, flag: CapabilityFlag) -> bool {
        !self.disabled.contains_flag(flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_disable_list() {
        let config = RuntimeConfig::parse_disabled("avx2, fma,,").unwrap();
        assert_eq!(config.disabled, CapabilitySet::AVX2 | CapabilitySet::FMA);
        assert!(config.allows(CapabilityFlag::Sse));
        assert!(!config.allows(CapabilityFlag::Fma));
    }

    #[test]
    fn test_parse_all_and_empty() {
        assert_eq!(RuntimeConfig::parse_disabled("ALL").unwrap().disabled, CapabilitySet::all());
        assert_eq!(RuntimeConfig::parse_disabled("").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let err = RuntimeConfig::parse_disabled("sse,avx512").unwrap_err();
        assert!(err.to_string().contains("avx512"));
    }
}
