//! Library crate for proxy-probe-rs exposing reusable modules.
pub mod configs;
pub mod diag;
pub mod error;
pub mod netcheck;
pub mod probe;
pub mod report;
pub mod runner;
pub mod types;
