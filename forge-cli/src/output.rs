//! Output formatting: one `OutputMode` threaded through every command,
//! producing either terse human text or the `{kind, message, hint?}` JSON
//! envelope on failure.

use forge_core::error::ForgeError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
    Jsonl,
}

impl OutputMode {
    pub fn from_flags(json: bool, jsonl: bool) -> Self {
        if jsonl {
            OutputMode::Jsonl
        } else if json {
            OutputMode::Json
        } else {
            OutputMode::Text
        }
    }
}

/// Prints a single-result command's outcome: a struct in JSON mode, or the
/// caller-supplied human-readable line in text mode.
pub fn print_one<T: Serialize>(mode: OutputMode, value: &T, human: impl FnOnce(&T) -> String) {
    match mode {
        OutputMode::Json | OutputMode::Jsonl => {
            println!("{}", serde_json::to_string(value).expect("result is serializable"));
        }
        OutputMode::Text => println!("{}", human(value)),
    }
}

/// Prints a list-shaped command's outcome: one JSON array in `--json` mode,
/// one JSON object per line in `--jsonl` mode, one line per item in text mode.
pub fn print_list<T: Serialize>(mode: OutputMode, items: &[T], human: impl Fn(&T) -> String) {
    match mode {
        OutputMode::Json => println!("{}", serde_json::to_string(items).expect("list is serializable")),
        OutputMode::Jsonl => {
            for item in items {
                println!("{}", serde_json::to_string(item).expect("item is serializable"));
            }
        }
        OutputMode::Text => {
            for item in items {
                println!("{}", human(item));
            }
        }
    }
}

/// Prints `err` in the appropriate mode and returns the process exit code:
/// `2` for misuse-shaped errors, `1` for everything else.
pub fn print_error(mode: OutputMode, err: &ForgeError) -> i32 {
    match mode {
        OutputMode::Json | OutputMode::Jsonl => {
            let envelope = err.to_envelope();
            eprintln!("{}", serde_json::to_string(&envelope).expect("envelope is serializable"));
        }
        OutputMode::Text => {
            eprintln!("error: {err}");
            if let Some(hint) = err.hint() {
                eprintln!("hint: {hint}");
            }
        }
    }
    match err {
        ForgeError::InvalidArgument(_) | ForgeError::Ambiguous(_) => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_flags_prefers_jsonl_over_json() {
        assert_eq!(OutputMode::from_flags(true, true), OutputMode::Jsonl);
    }

    #[test]
    fn from_flags_defaults_to_text() {
        assert_eq!(OutputMode::from_flags(false, false), OutputMode::Text);
    }

    #[test]
    fn invalid_argument_exits_with_misuse_code() {
        let err = ForgeError::InvalidArgument("bad flag".into());
        assert_eq!(print_error(OutputMode::Text, &err), 2);
    }

    #[test]
    fn not_found_exits_with_operational_failure_code() {
        let err = ForgeError::NotFound("loop x".into());
        assert_eq!(print_error(OutputMode::Text, &err), 1);
    }
}
