//! Fortran-callable bindings.
//!
//! Foreign callers pass every argument by pointer and store arrays
//! column-major; [`marshal`] converts at the boundary and [`exports`] holds
//! the entry points together with their decorated symbol aliases.
#![allow(clippy::missing_safety_doc)]

pub mod exports;
pub mod marshal;

pub use exports::ALIAS_NAMES;
pub use marshal::{MarshalError, ReadCharFn, WriteCharFn};
