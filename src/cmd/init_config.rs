//! Init-config command CLI handler.

use crate::config::config_template;
use anyhow::Context;
use std::fs;
use std::path::PathBuf;

pub(crate) fn run(output: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let template = config_template();
    let Some(path) = output else {
        print!("{}", template);
        return Ok(());
    };

    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, template)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    eprintln!("✓ Wrote {}", path.display());
    Ok(())
}
