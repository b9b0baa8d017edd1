use std::path::Path;
use std::process;

use tracing::error;

use isolator_core::container::child::ChildConfig;
use isolator_core::container::{self, child};
use isolator_core::image::{self, ExternalImageTool};
use isolator_core::recipe::{self, CommandRunner};
use isolator_core::registry;
use isolator_core::run_config::RunConfig;
use isolator_core::{ErrContext, Result};

mod config;
mod logging;
mod opts;

use opts::{Command, Opts};

fn main() {
    let opts = Opts::from_args();
    logging::setup(opts.quiet, opts.debug, opts.trace);

    if let Err(error) = run(opts) {
        error!(reason = %format!("{error:?}"), "isolator failed");
        process::exit(1);
    }
}

impl Opts {
    fn from_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}

/// Launcher that forwards to the container runtime, used both directly by
/// `run`/`exec` and as the [`CommandRunner`] the recipe interpreter drives
/// per build step.
struct Launcher<'a> {
    base: &'a Path,
}

impl CommandRunner for Launcher<'_> {
    fn run(&self, rootfs_slug: &str, argv: &[String]) -> Result<i32> {
        container::launch(
            self.base,
            &RunConfig {
                rootfs_slug: rootfs_slug.to_string(),
                argv: argv.to_vec(),
                gpu: false,
                gui: false,
            },
        )
    }
}

fn run(opts: Opts) -> Result<()> {
    let base = Path::new(isolator_core::DEFAULT_BASE_DIR);
    let config_path = config::resolve_path(opts.config.clone());

    match opts.command {
        Command::Pull { image } => {
            let tool = ExternalImageTool::default();
            let slug = image::materialize(base, &image, &tool)?;
            println!("{slug}");
            Ok(())
        }
        Command::Build { dir } => {
            let dir = dir.unwrap_or(std::env::current_dir().context("failed to get cwd")?);
            let tool = ExternalImageTool::default();
            let launcher = Launcher { base };
            let slug = recipe::build(&dir, base, &tool, &launcher)?;
            println!("{slug}");
            Ok(())
        }
        Command::Run {
            rootfs,
            gpu,
            gui,
            command,
        } => {
            let cfg = RunConfig {
                rootfs_slug: rootfs,
                argv: command,
                gpu,
                gui,
            };
            let code = container::launch(base, &cfg)?;
            process::exit(code);
        }
        Command::Exec { name, rootfs } => {
            let global = config::load(&config_path)?;
            let rootfs_slug = rootfs
                .or_else(|| global.default_rootfs.clone())
                .context("no rootfs given and no `default_rootfs` configured")?;
            let cfg = global
                .resolve_custom_command(&name, rootfs_slug)
                .with_context(|| format!("no custom command named `{name}` in configuration"))?;
            let code = container::launch(base, &cfg)?;
            process::exit(code);
        }
        Command::List => {
            for name in registry::list(base)? {
                println!("{name}");
            }
            Ok(())
        }
        Command::Rm { rootfs } => registry::remove(base, &rootfs),
        Command::Config => {
            let global = config::load(&config_path)?;
            println!("{global:#?}");
            Ok(())
        }
        Command::Child {
            rootfs,
            devices,
            device_dirs,
            gui,
            command,
        } => {
            match child::run(ChildConfig {
                rootfs,
                gpu_device_files: devices,
                gpu_device_dirs: device_dirs,
                gui,
                argv: command,
            }) {
                Ok(never) => match never {},
                Err(e) => Err(e),
            }
        }
    }
}
