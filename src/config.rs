//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`SKIFF_REGION`, `SKIFF_USER`, `SKIFF_PRIVATE_KEY`)
//! 2. TOML file specified via --config CLI flag
//! 3. ./skiff.toml in the current directory
//! 4. $XDG_CONFIG_HOME/skiff/skiff.toml (or ~/.config/skiff/skiff.toml)
//! 5. Built-in defaults

use crate::error::ConfigError;
use serde::Deserialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const DEFAULT_SKIFF_CONFIG_TEMPLATE: &str = include_str!("templates/skiff.toml");
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_SSH_USER: &str = "ec2-user";

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub aws: AwsConfig,
    pub ssh: SshConfig,
}

/// AWS account settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AwsConfig {
    /// Region the target instances live in.
    pub region: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.into(),
        }
    }
}

/// SSH login settings shared by every instance.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SshConfig {
    pub user: String,
    /// Path to the key-pair private key. None means ambient ssh credentials.
    pub private_key: Option<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: DEFAULT_SSH_USER.into(),
            private_key: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path (from --config flag).
pub fn load_config(path_override: Option<&str>) -> Result<Config, ConfigError> {
    let config_text = if let Some(p) = path_override {
        // Explicit path — fail if it doesn't exist.
        std::fs::read_to_string(p)?
    } else if let Ok(text) = std::fs::read_to_string("skiff.toml") {
        text
    } else if let Some(dir) = config_root_dir() {
        let global = dir.join("skiff").join("skiff.toml");
        std::fs::read_to_string(global).unwrap_or_default()
    } else {
        String::new()
    };

    let mut config: Config = toml::from_str(&config_text)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

fn apply_env_overrides<FEnv>(config: &mut Config, env_lookup: FEnv)
where
    FEnv: Fn(&str) -> Option<String>,
{
    if let Some(region) = env_lookup("SKIFF_REGION").and_then(|v| normalized_string(&v)) {
        config.aws.region = region;
    }
    if let Some(user) = env_lookup("SKIFF_USER").and_then(|v| normalized_string(&v)) {
        config.ssh.user = user;
    }
    if let Some(key) = env_lookup("SKIFF_PRIVATE_KEY").and_then(|v| normalized_string(&v)) {
        config.ssh.private_key = Some(key);
    }
}

/// Return the default per-user config path (`~/.config/skiff/skiff.toml`).
pub fn default_global_config_path() -> Option<PathBuf> {
    config_root_dir().map(|dir| dir.join("skiff").join("skiff.toml"))
}

/// Ensure the default global config file exists.
///
/// Returns the global config path when available on this platform.
pub fn ensure_default_global_config() -> Result<Option<PathBuf>, ConfigError> {
    let Some(path) = default_global_config_path() else {
        return Ok(None);
    };
    ensure_default_global_config_at_path(&path)?;
    Ok(Some(path))
}

fn ensure_default_global_config_at_path(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // create_new avoids clobbering an existing file if another process won the race.
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(DEFAULT_SKIFF_CONFIG_TEMPLATE.as_bytes())?;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(ConfigError::Io(e)),
    }
}

/// Result of explicit global config initialization (`skiff init`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalConfigInitResult {
    Created { path: PathBuf },
    AlreadyInitialized { path: PathBuf },
    Overwritten { path: PathBuf, backup_path: PathBuf },
}

/// Initialize `~/.config/skiff/skiff.toml`.
///
/// - Without `force`, returns `AlreadyInitialized` if the file exists.
/// - With `force`, backs up the existing file in the same directory using a
///   timestamped name, then rewrites it from the compiled template.
pub fn initialize_default_global_config(
    force: bool,
) -> Result<GlobalConfigInitResult, ConfigError> {
    let path = default_global_config_path().ok_or_else(|| {
        ConfigError::Invalid(
            "unable to resolve default config path for ~/.config/skiff/skiff.toml".to_string(),
        )
    })?;
    initialize_default_global_config_at_path(&path, force)
}

fn initialize_default_global_config_at_path(
    path: &Path,
    force: bool,
) -> Result<GlobalConfigInitResult, ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if path.exists() {
        if !force {
            return Ok(GlobalConfigInitResult::AlreadyInitialized {
                path: path.to_path_buf(),
            });
        }
        let backup_path = timestamped_backup_path(path);
        std::fs::copy(path, &backup_path)?;
        std::fs::write(path, DEFAULT_SKIFF_CONFIG_TEMPLATE)?;
        return Ok(GlobalConfigInitResult::Overwritten {
            path: path.to_path_buf(),
            backup_path,
        });
    }

    // create_new avoids clobbering if another process wins a race to create.
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(DEFAULT_SKIFF_CONFIG_TEMPLATE.as_bytes())?;
            Ok(GlobalConfigInitResult::Created {
                path: path.to_path_buf(),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Ok(GlobalConfigInitResult::AlreadyInitialized {
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(ConfigError::Io(e)),
    }
}

fn timestamped_backup_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|value| value.to_string_lossy().into_owned())
        .unwrap_or_else(|| "skiff.toml".to_string());
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    for suffix in 0..1000usize {
        let candidate_name = if suffix == 0 {
            format!("{file_name}.{timestamp}.bak")
        } else {
            format!("{file_name}.{timestamp}.{suffix}.bak")
        };
        let candidate = path.with_file_name(candidate_name);
        if !candidate.exists() {
            return candidate;
        }
    }

    path.with_file_name(format!(
        "{file_name}.{timestamp}.{}.bak",
        std::process::id()
    ))
}

fn normalized_string(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn config_root_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".config"))
        .or_else(dirs::config_dir)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let c = Config::default();
        assert_eq!(c.aws.region, "us-east-1");
        assert_eq!(c.ssh.user, "ec2-user");
        assert_eq!(c.ssh.private_key, None);
    }

    #[test]
    fn parse_partial_toml() {
        let c: Config = toml::from_str(
            r#"
            [ssh]
            user = "ubuntu"
        "#,
        )
        .unwrap();
        assert_eq!(c.ssh.user, "ubuntu");
        assert_eq!(c.aws.region, "us-east-1");
    }

    #[test]
    fn parse_full_toml() {
        let c: Config = toml::from_str(
            r#"
            [aws]
            region = "eu-west-1"

            [ssh]
            user = "ubuntu"
            private_key = "/home/dev/.ssh/cluster.pem"
        "#,
        )
        .unwrap();
        assert_eq!(c.aws.region, "eu-west-1");
        assert_eq!(c.ssh.private_key.as_deref(), Some("/home/dev/.ssh/cluster.pem"));
    }

    #[test]
    fn parse_empty_string() {
        let c: Config = toml::from_str("").unwrap();
        assert_eq!(c, Config::default());
    }

    #[test]
    fn template_parses_to_defaults() {
        let c: Config = toml::from_str(DEFAULT_SKIFF_CONFIG_TEMPLATE).unwrap();
        assert_eq!(c, Config::default());
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut c: Config = toml::from_str(
            r#"
            [aws]
            region = "eu-west-1"
        "#,
        )
        .unwrap();

        apply_env_overrides(&mut c, |name| match name {
            "SKIFF_REGION" => Some("ap-southeast-2".into()),
            "SKIFF_PRIVATE_KEY" => Some("/tmp/key.pem".into()),
            _ => None,
        });

        assert_eq!(c.aws.region, "ap-southeast-2");
        assert_eq!(c.ssh.private_key.as_deref(), Some("/tmp/key.pem"));
        assert_eq!(c.ssh.user, "ec2-user");
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut c = Config::default();
        apply_env_overrides(&mut c, |name| {
            (name == "SKIFF_REGION").then(|| "   ".into())
        });
        assert_eq!(c.aws.region, "us-east-1");
    }

    #[test]
    fn ensure_default_global_config_writes_template_once() {
        let tmp_root = std::env::temp_dir().join(format!(
            "skiff-config-ensure-test-{}-{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let path = tmp_root.join("skiff").join("skiff.toml");

        ensure_default_global_config_at_path(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, DEFAULT_SKIFF_CONFIG_TEMPLATE);

        std::fs::write(&path, "user-edited").unwrap();
        ensure_default_global_config_at_path(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "user-edited");

        std::fs::remove_dir_all(&tmp_root).unwrap();
    }

    #[test]
    fn initialize_global_config_returns_already_initialized_without_force() {
        let tmp_root = std::env::temp_dir().join(format!(
            "skiff-config-init-test-{}-{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let path = tmp_root.join("skiff").join("skiff.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "old-config").unwrap();

        let outcome = initialize_default_global_config_at_path(&path, false).unwrap();
        assert!(matches!(
            outcome,
            GlobalConfigInitResult::AlreadyInitialized { path: ref p } if p == &path
        ));
        let current = std::fs::read_to_string(&path).unwrap();
        assert_eq!(current, "old-config");

        std::fs::remove_dir_all(&tmp_root).unwrap();
    }

    #[test]
    fn initialize_global_config_creates_from_template() {
        let tmp_root = std::env::temp_dir().join(format!(
            "skiff-config-create-test-{}-{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let path = tmp_root.join("skiff").join("skiff.toml");

        let outcome = initialize_default_global_config_at_path(&path, false).unwrap();
        assert!(matches!(
            outcome,
            GlobalConfigInitResult::Created { path: ref p } if p == &path
        ));
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, DEFAULT_SKIFF_CONFIG_TEMPLATE);

        std::fs::remove_dir_all(&tmp_root).unwrap();
    }

    #[test]
    fn initialize_global_config_force_overwrites_and_creates_backup() {
        let tmp_root = std::env::temp_dir().join(format!(
            "skiff-config-force-test-{}-{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let path = tmp_root.join("skiff").join("skiff.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "old-config").unwrap();

        let outcome = initialize_default_global_config_at_path(&path, true).unwrap();
        let backup_path = match outcome {
            GlobalConfigInitResult::Overwritten {
                path: returned_path,
                backup_path,
            } => {
                assert_eq!(returned_path, path);
                backup_path
            }
            other => panic!("unexpected outcome: {other:?}"),
        };

        let current = std::fs::read_to_string(&path).unwrap();
        assert_eq!(current, DEFAULT_SKIFF_CONFIG_TEMPLATE);
        let backup = std::fs::read_to_string(&backup_path).unwrap();
        assert_eq!(backup, "old-config");
        assert_eq!(backup_path.parent(), path.parent());

        std::fs::remove_dir_all(&tmp_root).unwrap();
    }
}
