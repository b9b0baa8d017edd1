//! Global configuration loading.
//!
//! A missing config file is not an error -- it's only consulted if
//! present; a malformed one is.

use std::path::{Path, PathBuf};

use isolator_core::run_config::GlobalConfig;
use isolator_core::{ErrContext, Result};

pub const DEFAULT_CONFIG_FILE: &str = ".isolator.toml";

/// Resolves the effective config path: the `--config` override if given,
/// else `<config_dir>/.isolator.toml`, else the bare file name in the
/// current directory.
pub fn resolve_path(override_path: Option<PathBuf>) -> PathBuf {
    override_path.unwrap_or_else(|| match dirs_next::config_dir() {
        Some(dir) => dir.join(DEFAULT_CONFIG_FILE),
        None => PathBuf::from(DEFAULT_CONFIG_FILE),
    })
}

/// Loads and parses `path`. Returns the default configuration if the file
/// does not exist.
pub fn load(path: &Path) -> Result<GlobalConfig> {
    if !path.exists() {
        return Ok(GlobalConfig::default());
    }
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file `{}`", path.display()))?;
    toml::from_str(&body)
        .with_context(|| format!("failed to parse configuration file `{}`", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.default_rootfs, None);
        assert!(!config.auto_gpu);
    }

    #[test]
    fn parses_custom_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("isolator.toml");
        std::fs::write(
            &path,
            r#"
            default_rootfs = "alpine_3.19"
            auto_gpu = true

            [custom_commands.shell]
            command = "/bin/sh"
            args = ["-l"]
            gui = true
            "#,
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.default_rootfs.as_deref(), Some("alpine_3.19"));
        assert!(config.auto_gpu);
        let shell = config.custom_commands.get("shell").unwrap();
        assert_eq!(shell.command, "/bin/sh");
        assert_eq!(shell.args, vec!["-l"]);
        assert!(shell.gui);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("isolator.toml");
        std::fs::write(&path, "this is not valid toml =").unwrap();
        assert!(load(&path).is_err());
    }
}
