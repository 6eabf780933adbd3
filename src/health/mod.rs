// src/health/mod.rs
mod prober;

pub use prober::{HealthError, HealthProber, ProbeResult};
