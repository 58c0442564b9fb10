use std::path::Path;

use anyhow::bail;
use wasiboot_core::BootConfig;
use wasiboot_core::DEFAULT_ARTIFACT_PATH;
use wasiboot_core::config::CONFIG_FILE_NAME;

pub fn init(path: &str, artifact: Option<&str>, force: bool) -> anyhow::Result<()> {
    let output = Path::new(path).join(CONFIG_FILE_NAME);
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }

    let config = BootConfig::scaffold(artifact.unwrap_or(DEFAULT_ARTIFACT_PATH));
    std::fs::write(&output, config.to_toml_string()?)?;
    println!("✓ Generated {}", output.display());

    Ok(())
}
