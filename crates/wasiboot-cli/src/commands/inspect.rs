use std::path::Path;

use wasiboot_core::{ModuleSummary, WASI_P1_MODULE};
use wasiboot_runtime::Runtime;

use super::run::load_config;

pub async fn inspect(
    artifact: Option<&Path>,
    config: Option<&Path>,
    entry: Option<&str>,
    format: &str,
) -> anyhow::Result<()> {
    let boot_config = load_config(config)?;
    let path = artifact
        .map(Path::to_path_buf)
        .unwrap_or_else(|| boot_config.artifact_path());
    let entry = entry
        .map(str::to_string)
        .unwrap_or_else(|| boot_config.entry());

    let runtime = Runtime::new()?;
    let summary = runtime.inspect(&path, &entry).await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        _ => {
            print!("{}", format_summary(&summary));
        }
    }

    Ok(())
}

pub fn format_summary(summary: &ModuleSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("module   {}\n", summary.name));
    if let Some(path) = &summary.path {
        out.push_str(&format!("path     {path}\n"));
    }
    out.push_str(&format!("size     {} bytes\n", summary.size_bytes));
    out.push_str(&format!("sha256   {}\n", summary.sha256));
    let marker = if summary.has_entry { "✓" } else { "✗ not exported" };
    out.push_str(&format!("entry    {} {marker}\n", summary.entry));

    out.push_str(&format!("\nimports ({})\n", summary.imports.len()));
    for import in &summary.imports {
        let note = if import.module == WASI_P1_MODULE {
            ""
        } else {
            "  (not provided by the shim)"
        };
        out.push_str(&format!(
            "  {:<7}{}::{}{note}\n",
            import.kind.label(),
            import.module,
            import.name
        ));
    }

    out.push_str(&format!("\nexports ({})\n", summary.exports.len()));
    for export in &summary.exports {
        out.push_str(&format!("  {:<7}{}\n", export.kind.label(), export.name));
    }
    out
}
