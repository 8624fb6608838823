use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Instruction-set extensions the engine knows how to probe for.
///
/// Discriminants index the capability cache; append new variants at the end.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityFlag {
    Sse = 0,
    Sse2 = 1,
    Avx = 2,
    Avx2 = 3,
    Fma = 4,
    Neon = 5,
}

impl CapabilityFlag {
    pub const COUNT: usize = 6;

    pub const ALL: [CapabilityFlag; Self::COUNT] = [
        CapabilityFlag::Sse,
        CapabilityFlag::Sse2,
        CapabilityFlag::Avx,
        CapabilityFlag::Avx2,
        CapabilityFlag::Fma,
        CapabilityFlag::Neon,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            CapabilityFlag::Sse => "sse",
            CapabilityFlag::Sse2 => "sse2",
            CapabilityFlag::Avx => "avx",
            CapabilityFlag::Avx2 => "avx2",
            CapabilityFlag::Fma => "fma",
            CapabilityFlag::Neon => "neon",
        }
    }

    /// Width in bytes of the vector registers kernels gated by this flag use.
    pub fn vector_width(self) -> usize {
        match self {
            CapabilityFlag::Sse | CapabilityFlag::Sse2 | CapabilityFlag::Neon => 16,
            CapabilityFlag::Avx | CapabilityFlag::Avx2 | CapabilityFlag::Fma => 32,
        }
    }

    pub fn bit(self) -> CapabilitySet {
        CapabilitySet::from_bits_truncate(1 << self.index())
    }
}

impl fmt::Display for CapabilityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown capability flag: {0:?}")]
pub struct UnknownFlag(pub String);

impl FromStr for CapabilityFlag {
    type Err = UnknownFlag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|flag| flag.name() == wanted)
            .ok_or_else(|| UnknownFlag(s.to_string()))
    }
}

/// Per-flag verdict held by the capability cache.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeResult {
    Unknown = 0,
    Supported = 1,
    Unsupported = 2,
}

impl ProbeResult {
    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            1 => ProbeResult::Supported,
            2 => ProbeResult::Unsupported,
            _ => ProbeResult::Unknown,
        }
    }

    pub fn from_verdict(supported: bool) -> Self {
        if supported {
            ProbeResult::Supported
        } else {
            ProbeResult::Unsupported
        }
    }

    pub fn is_known(self) -> bool {
        self != ProbeResult::Unknown
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CapabilitySet: u32 {
        const SSE = 1 << 0;
        const SSE2 = 1 << 1;
        const AVX = 1 << 2;
        const AVX2 = 1 << 3;
        const FMA = 1 << 4;
        const NEON = 1 << 5;
    }
}

impl CapabilitySet {
    pub fn contains_flag(&self, flag: CapabilityFlag) -> bool {
        self.contains(flag.bit())
    }

    pub fn flags(&self) -> impl Iterator<Item = CapabilityFlag> + '_ {
        CapabilityFlag::ALL
            .into_iter()
            .filter(move |flag| self.contains_flag(*flag))
    }
}

impl FromIterator<CapabilityFlag> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = CapabilityFlag>>(iter: I) -> Self {
        iter.into_iter()
            .fold(CapabilitySet::empty(), |set, flag| set | flag.bit())
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.flags().map(CapabilityFlag::name).collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join(","))
        }
    }
}
