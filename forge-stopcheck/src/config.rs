//! `loop.metadata.stop_config` shapes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum When {
    Before,
    After,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Stop,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    Any,
    Empty,
    Nonempty,
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::Any
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantitativeConfig {
    pub cmd: String,
    pub every_n: u64,
    pub when: When,
    pub decision: Decision,
    #[serde(default)]
    pub exit_codes: Vec<i32>,
    #[serde(default)]
    pub exit_invert: bool,
    #[serde(default)]
    pub stdout_mode: OutputMode,
    #[serde(default)]
    pub stderr_mode: OutputMode,
    #[serde(default)]
    pub stdout_regex: Option<String>,
    #[serde(default)]
    pub stderr_regex: Option<String>,
    #[serde(default)]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnInvalid {
    Stop,
    Continue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitativeConfig {
    pub every_n: u64,
    pub prompt: String,
    pub is_path: bool,
    pub on_invalid: OnInvalid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopConfig {
    #[serde(default)]
    pub quantitative: Option<QuantitativeConfig>,
    #[serde(default)]
    pub qualitative: Option<QualitativeConfig>,
}
