//! Configuration file format, profile registry, and the standard
//! config/data directory layout (`~/.config/forge`, `~/.local/share/forge`).

use forge_core::error::{ForgeError, Result};
use forge_runtime::{Profile, PromptMode};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    profiles: HashMap<String, ProfileFile>,
    #[serde(default)]
    default_profile: Option<String>,
    #[serde(default)]
    mail_remote_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProfileFile {
    command_template: String,
    #[serde(default)]
    prompt_mode: Option<String>,
    #[serde(default)]
    auth_home: Option<String>,
}

/// Resolved runtime configuration for one CLI invocation.
pub struct Config {
    pub profiles: HashMap<String, Profile>,
    pub default_profile: Option<String>,
    pub mail_remote_url: Option<String>,
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl Config {
    /// Loads `explicit_path` if given, else `~/.config/forge/config.toml` if
    /// it exists, else falls back to an empty config (no profiles defined).
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let config_dir = default_config_dir();
        let data_dir = default_data_dir();

        let path = explicit_path.map(Path::to_path_buf).unwrap_or_else(|| config_dir.join("config.toml"));
        let file = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(ForgeError::Io)?;
            toml::from_str::<ConfigFile>(&text)
                .map_err(|e| ForgeError::InvalidArgument(format!("malformed config at {}: {e}", path.display())))?
        } else {
            ConfigFile::default()
        };

        let profiles = file
            .profiles
            .into_iter()
            .map(|(id, p)| {
                let prompt_mode = match p.prompt_mode.as_deref() {
                    Some("env") => PromptMode::Env,
                    _ => PromptMode::Stdin,
                };
                let profile = Profile { id: id.clone(), command_template: p.command_template, prompt_mode, auth_home: p.auth_home };
                (id, profile)
            })
            .collect();

        Ok(Self { profiles, default_profile: file.default_profile, mail_remote_url: file.mail_remote_url, config_dir, data_dir })
    }

    /// Resolves a profile id (or the configured default) to a `Profile`.
    pub fn profile(&self, id: Option<&str>) -> Result<Profile> {
        let id = id.or(self.default_profile.as_deref());
        match id {
            Some(id) => self.profiles.get(id).cloned().ok_or_else(|| ForgeError::NotFound(format!("profile '{id}'"))),
            None => Ok(Profile::local_shell("default", "sh -c 'cat'")),
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("forge.db")
    }

    pub fn loop_dir(&self, name: &str, id: &str) -> PathBuf {
        self.data_dir.join("loops").join(format!("{name}-{id}"))
    }
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("forge")
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("forge")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_yields_empty_profile_registry() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("no-such.toml"))).unwrap();
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn loads_profiles_and_default_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            default_profile = "claude"

            [profiles.claude]
            command_template = "claude --print"
            prompt_mode = "stdin"
            "#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("claude"));
        let profile = config.profile(None).unwrap();
        assert_eq!(profile.id, "claude");
        assert_eq!(profile.command_template, "claude --print");
    }

    #[test]
    fn unknown_profile_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("missing.toml"))).unwrap();
        let err = config.profile(Some("nope")).unwrap_err();
        assert!(matches!(err, ForgeError::NotFound(_)));
    }
}
