//! Foundation utilities shared by the execwarden crates.

pub mod atomic_write;
pub mod logging;
pub mod paths;
