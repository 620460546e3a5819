//! Smart-stop evaluators: quantitative shell-command checks and
//! qualitative judge-iteration verdict interpretation.

pub mod config;
pub mod qualitative;
pub mod quantitative;

pub use config::{Decision, OnInvalid, OutputMode, QualitativeConfig, QuantitativeConfig, StopConfig, When};
