//! Command line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "isolator",
    version,
    about = "Materializes and launches unprivileged Linux containers"
)]
pub struct Opts {
    /// Suppress all output below warnings.
    #[arg(short, long, global = true)]
    pub quiet: bool,
    /// Enable debug-level logging.
    #[arg(short, long, global = true)]
    pub debug: bool,
    /// Enable trace-level logging.
    #[arg(short, long, global = true)]
    pub trace: bool,
    /// Path to the global configuration file (default: `.isolator.toml` in
    /// the config directory, consulted only if present).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pulls an image and materializes it into a rootfs.
    Pull {
        /// Image reference accepted by the external image tool.
        image: String,
    },
    /// Builds a derived rootfs from a recipe file.
    Build {
        /// Directory containing the recipe file. Defaults to the current
        /// working directory.
        dir: Option<PathBuf>,
    },
    /// Runs a command inside a materialized rootfs.
    Run {
        /// Name of the materialized rootfs to run in.
        rootfs: String,
        /// Forward host GPU devices into the container.
        #[arg(long)]
        gpu: bool,
        /// Forward the host X11 socket into the container.
        #[arg(long)]
        gui: bool,
        /// Command and arguments to execute.
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Runs a named custom command from the global configuration.
    Exec {
        /// Name of a `custom_commands` entry in the global configuration.
        name: String,
        /// Rootfs to run the custom command in, overriding `default_rootfs`.
        #[arg(long)]
        rootfs: Option<String>,
    },
    /// Lists materialized rootfs directories.
    List,
    /// Removes a materialized rootfs.
    Rm {
        /// Name of the rootfs to remove.
        rootfs: String,
    },
    /// Prints the effective global configuration.
    Config,
    /// Internal: runs as pid 1 inside a freshly entered set of namespaces.
    /// Not part of the documented CLI surface -- wired into dispatch before
    /// the rest of argument parsing can reject it as unknown.
    #[command(hide = true)]
    Child {
        /// Absolute path of the rootfs to pivot into.
        rootfs: PathBuf,
        /// Host GPU device file to bind-mount, detected by the parent
        /// before it entered any namespace. May repeat.
        #[arg(long = "device")]
        devices: Vec<PathBuf>,
        /// Host GPU device directory to bind-mount (e.g. `/dev/dri`),
        /// detected by the parent before it entered any namespace. Kept
        /// separate from `--device` because the mount point created for it
        /// must be a directory, not a file. May repeat.
        #[arg(long = "device-dir")]
        device_dirs: Vec<PathBuf>,
        /// Bind-mount the host X11 socket and preserve `DISPLAY`.
        #[arg(long)]
        gui: bool,
        /// Command and arguments to exec after container setup.
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}
