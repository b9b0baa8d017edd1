//! Run configuration and global runtime configuration.
//!
//! These are plain data types. Loading a `GlobalConfig` from a TOML file on
//! disk is out of scope for this crate; the CLI front end parses the file
//! and hands a populated value to [`GlobalConfig::resolve_custom_command`].

use std::collections::BTreeMap;

/// The inputs to the container launcher. Mutated only by the CLI
/// front end before hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub rootfs_slug: String,
    pub argv: Vec<String>,
    pub gpu: bool,
    pub gui: bool,
}

/// A named shortcut for a command, as recorded in `custom_commands` of the
/// global configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct CustomCommand {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub gpu: bool,
    #[serde(default)]
    pub gui: bool,
}

/// Global runtime configuration, consulted only to fill unspecified
/// fields of a [`RunConfig`].
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct GlobalConfig {
    pub default_rootfs: Option<String>,
    #[serde(default)]
    pub auto_gpu: bool,
    #[serde(default)]
    pub auto_gui: bool,
    #[serde(default)]
    pub custom_commands: BTreeMap<String, CustomCommand>,
}

impl GlobalConfig {
    /// Looks up a configured custom command by name and resolves it to a
    /// [`RunConfig`] against `rootfs_slug` (the caller-supplied or
    /// `default_rootfs` slug).
    pub fn resolve_custom_command(&self, name: &str, rootfs_slug: String) -> Option<RunConfig> {
        let custom = self.custom_commands.get(name)?;
        let mut argv = vec![custom.command.clone()];
        argv.extend(custom.args.iter().cloned());
        Some(RunConfig {
            rootfs_slug,
            argv,
            gpu: custom.gpu || self.auto_gpu,
            gui: custom.gui || self.auto_gui,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn resolve_custom_command_merges_auto_flags() {
        let mut config = GlobalConfig {
            auto_gpu: true,
            ..Default::default()
        };
        config.custom_commands.insert(
            "shell".to_string(),
            CustomCommand {
                command: "/bin/sh".to_string(),
                args: vec!["-l".to_string()],
                gpu: false,
                gui: true,
            },
        );

        let run_cfg = config
            .resolve_custom_command("shell", "alpine_3.19".to_string())
            .unwrap();

        assert_eq!(run_cfg.rootfs_slug, "alpine_3.19");
        assert_eq!(run_cfg.argv, vec!["/bin/sh", "-l"]);
        assert!(run_cfg.gpu, "auto_gpu should widen the custom command's own flag");
        assert!(run_cfg.gui);
    }

    #[test]
    fn resolve_unknown_custom_command_returns_none() {
        let config = GlobalConfig::default();
        assert!(config
            .resolve_custom_command("missing", "alpine_3.19".to_string())
            .is_none());
    }
}
