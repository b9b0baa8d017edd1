//! Recipe interpreter.
//!
//! Parses the declarative build recipe and orchestrates the image
//! materializer followed by the container launcher for each build step.
//! The raw deserialized representation (`RecipeRep`) is kept separate from
//! the resolved `Recipe` value so schema changes don't leak into the rest
//! of the crate.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::image::{self, ImageTool};
use crate::{err, ErrContext, Result};

/// Fixed recipe file name, `Dockerfile`-style.
pub const RECIPE_FILE_NAME: &str = "Isolatorfile";

/// Raw representation of the document enclosed in `[ ... ]`. Unknown
/// top-level keys are rejected to catch typos.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecipeRep {
    from: String,
    #[serde(default)]
    commands: Vec<String>,
    #[serde(default)]
    env: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    ports: Vec<String>,
    #[serde(default)]
    volumes: Vec<String>,
}

/// A parsed recipe. `env`/`ports`/`volumes` are recorded metadata only; they
/// are not applied at run time.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub from: String,
    pub commands: Vec<String>,
    pub env: std::collections::BTreeMap<String, String>,
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
}

impl From<RecipeRep> for Recipe {
    fn from(rep: RecipeRep) -> Self {
        Self {
            from: rep.from,
            commands: rep.commands,
            env: rep.env,
            ports: rep.ports,
            volumes: rep.volumes,
        }
    }
}

/// Reads `<dir>/Isolatorfile`, verifies the `[ ... ]` framing, and parses the
/// inner document.
pub fn load(dir: &Path) -> Result<Recipe> {
    let path = dir.join(RECIPE_FILE_NAME);
    let body = fs::read_to_string(&path)
        .with_context(|| format!("failed to read recipe file `{}`", path.display()))?;

    let trimmed = body.trim();
    if !trimmed.starts_with('[') || !trimmed.ends_with(']') {
        return err!(
            "recipe file `{}` is not framed in `[ ... ]`",
            path.display()
        );
    }
    let inner = &trimmed[1..trimmed.len() - 1];

    let rep: RecipeRep = serde_yaml::from_str(inner)
        .with_context(|| format!("failed to parse recipe file `{}`", path.display()))?;

    Ok(rep.into())
}

/// Runs a single command inside a materialized rootfs and returns its exit
/// code. Implemented by the container launcher; kept as a trait here so the
/// recipe interpreter doesn't need a hard dependency on the
/// namespace/pivot_root machinery to be unit-testable.
pub trait CommandRunner {
    fn run(&self, rootfs_slug: &str, argv: &[String]) -> Result<i32>;
}

/// Builds a derived rootfs from the recipe in `dir`.
///
/// Materializes `recipe.from`, copies it on the host filesystem to
/// `<base_slug>-built` (preserving modes and symlinks, never mutating the
/// base rootfs), then runs each command in `recipe.commands` against the
/// copy with `gpu = false, gui = false`. If any step fails, the build stops
/// and the partial derived rootfs is left on disk for inspection.
pub fn build(
    dir: &Path,
    base: &Path,
    tool: &dyn ImageTool,
    runner: &dyn CommandRunner,
) -> Result<String> {
    let recipe = load(dir)?;

    let base_slug = image::materialize(base, &recipe.from, tool)?;
    let built_slug = format!("{base_slug}-built");

    let base_rootfs = base.join(&base_slug);
    let built_rootfs = base.join(&built_slug);
    if built_rootfs.exists() {
        fs::remove_dir_all(&built_rootfs).with_context(|| {
            format!(
                "failed to remove previous derived rootfs `{}`",
                built_rootfs.display()
            )
        })?;
    }
    copy_tree(&base_rootfs, &built_rootfs)
        .with_context(|| format!("failed to copy `{base_slug}` to `{built_slug}`"))?;

    for command in &recipe.commands {
        let argv: Vec<String> = command.split_whitespace().map(str::to_owned).collect();
        if argv.is_empty() {
            continue;
        }
        tracing::info!(command, "running build step");
        let status = runner.run(&built_slug, &argv)?;
        if status != 0 {
            return err!(
                "build step `{}` exited with status {}; partial rootfs left at `{}`",
                command,
                status,
                built_rootfs.display()
            );
        }
    }

    tracing::info!(
        env = ?recipe.env,
        ports = ?recipe.ports,
        volumes = ?recipe.volumes,
        "recorded recipe metadata (informational only, not applied at run time)"
    );

    Ok(built_slug)
}

/// Recursively copies `src` to `dst` on the host filesystem, preserving file
/// modes and symlinks, without ever mutating `src`.
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    use std::os::unix::fs::{symlink, PermissionsExt};

    fs::create_dir_all(dst)?;

    for entry in walkdir::WalkDir::new(src).min_depth(1) {
        let entry = entry.context("failed to walk source tree")?;
        let relative = entry.path().strip_prefix(src).expect("within src");
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            let mode = entry.metadata()?.permissions().mode();
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
        } else if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())?;
            let _ = fs::remove_file(&target);
            symlink(&link_target, &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            let mode = entry.metadata()?.permissions().mode();
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
        }
    }

    Ok(())
}
