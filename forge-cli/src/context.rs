//! Shared handles every command dispatches against: the Store, resolved
//! configuration, and the output mode selected by global flags.

use crate::config::Config;
use crate::output::OutputMode;
use forge_core::error::Result;
use forge_core::store::Store;

pub struct Context {
    pub store: Store,
    pub config: Config,
    pub mode: OutputMode,
    pub yes: bool,
    pub non_interactive: bool,
}

impl Context {
    pub fn new(store: Store, config: Config, mode: OutputMode, yes: bool, non_interactive: bool) -> Self {
        Self { store, config, mode, yes, non_interactive }
    }

    /// Prompts for confirmation unless `--yes` was passed; `--non-interactive`
    /// without `--yes` refuses rather than blocking on stdin.
    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.yes {
            return Ok(true);
        }
        if self.non_interactive {
            return Ok(false);
        }
        eprint!("{prompt} [y/N] ");
        use std::io::Write;
        std::io::stderr().flush().ok();
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok();
        Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}
