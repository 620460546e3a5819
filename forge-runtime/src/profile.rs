use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    Env,
    Stdin,
}

impl Default for PromptMode {
    fn default() -> Self {
        PromptMode::Stdin
    }
}

/// An agent harness definition: how to invoke it and how it expects the
/// prompt delivered. The iteration driver resolves the template at spawn
/// time rather than dispatching through a per-harness trait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub command_template: String,
    #[serde(default)]
    pub prompt_mode: PromptMode,
    pub auth_home: Option<String>,
}

impl Profile {
    pub fn local_shell(id: impl Into<String>, command_template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command_template: command_template.into(),
            prompt_mode: PromptMode::Stdin,
            auth_home: None,
        }
    }
}
