pub mod api;
pub mod core;
pub mod ffi;
pub mod simd;

pub use crate::core::cache::is_supported;
pub use crate::core::flags::{CapabilityFlag, CapabilitySet, ProbeResult};
