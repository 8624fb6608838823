pub mod alignment;
pub mod cache;
pub mod diagnostics;
pub mod flags;
pub mod hardware;
pub mod probe;
pub mod runtime;
pub mod trap;
