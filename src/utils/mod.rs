//! Utility modules

pub mod progress;
