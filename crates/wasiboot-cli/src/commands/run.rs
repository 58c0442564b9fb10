//! `wasiboot run` — bootstrap a module and return its exit code.
//!
//! Settings are layered: built-in defaults, then `wasiboot.toml` (explicit
//! `--config` or the one in the working directory), then command-line flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::info;

use wasiboot_core::config::OutputRoute;
use wasiboot_core::{BootConfig, parse_byte_size};
use wasiboot_host::{OutputSink, Preopen, ShimConfig};
use wasiboot_runtime::artifact::artifact_name;
use wasiboot_runtime::{BootPlan, Bootstrapper};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the wasm artifact
    pub artifact: Option<PathBuf>,
    /// Config file (default: ./wasiboot.toml if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Entry point export to invoke (default: _start)
    #[arg(long)]
    pub entry: Option<String>,
    /// Silenced runs to perform before the real one
    #[arg(long)]
    pub warmup: Option<u32>,
    /// Guest stdout routing: inherit or discard
    #[arg(long)]
    pub stdout: Option<OutputRoute>,
    /// Guest stderr routing: inherit or discard
    #[arg(long)]
    pub stderr: Option<OutputRoute>,
    /// Environment variable for the guest (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,
    /// Pass the host environment through to the guest
    #[arg(long)]
    pub inherit_env: bool,
    /// Preopen a host directory (repeatable); guest path defaults to the host path
    #[arg(long = "dir", value_name = "HOST[::GUEST]")]
    pub dirs: Vec<String>,
    /// Linear memory limit, e.g. 256MiB
    #[arg(long)]
    pub memory: Option<String>,
    /// Arguments passed to the guest after argv[0]
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Run the `wasiboot run` command.
pub async fn run(args: RunArgs) -> Result<i32> {
    let config = load_config(args.config.as_deref())?;
    let plan = build_plan(&config, &args)?;

    info!(
        artifact = %plan.artifact.display(),
        entry = %plan.entry,
        warmup = plan.warmup_iterations,
        "starting bootstrap"
    );

    let bootstrapper = Bootstrapper::new()?;
    let outcome = bootstrapper
        .run(&plan)
        .await
        .with_context(|| format!("failed to run {}", plan.artifact.display()))?;

    Ok(outcome.status.code())
}

pub fn load_config(path: Option<&Path>) -> Result<BootConfig> {
    match path {
        Some(path) => BootConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(BootConfig::discover(Path::new("."))?),
    }
}

fn build_plan(config: &BootConfig, args: &RunArgs) -> Result<BootPlan> {
    let artifact = args
        .artifact
        .clone()
        .unwrap_or_else(|| config.artifact_path());

    let mut shim = ShimConfig::from_boot_config(config, &artifact_name(&artifact));
    shim = shim.with_args(args.args.iter().cloned());

    if let Some(route) = args.stdout {
        shim = shim.with_stdout(route.into());
    }
    if let Some(route) = args.stderr {
        shim = shim.with_stderr(route.into());
    }
    if is_capture(shim.stdout) || is_capture(shim.stderr) {
        bail!("capture routing has no reader on the command line; use inherit or discard");
    }

    if args.inherit_env {
        shim.inherit_env = true;
    }
    for pair in &args.env {
        let (key, value) = parse_env(pair)?;
        shim = shim.with_env(key, value);
    }
    for dir in &args.dirs {
        shim = shim.with_preopen(parse_dir(dir)?);
    }
    if let Some(memory) = &args.memory {
        let limit = parse_byte_size(memory)
            .with_context(|| format!("--memory `{memory}` is not a byte size"))?;
        shim = shim.with_memory_limit(limit);
    }

    let mut plan = BootPlan::new(artifact)
        .with_shim(shim)
        .with_entry(args.entry.clone().unwrap_or_else(|| config.entry()))
        .with_warmup(config.warmup_iterations());
    if let Some(warmup) = args.warmup {
        plan = plan.with_warmup(warmup);
    }
    Ok(plan)
}

fn is_capture(sink: OutputSink) -> bool {
    matches!(sink, OutputSink::Capture { .. })
}

fn parse_env(pair: &str) -> Result<(String, String)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("--env `{pair}` must be KEY=VALUE"),
    }
}

fn parse_dir(spec: &str) -> Result<Preopen> {
    let (host, guest) = match spec.split_once("::") {
        Some((host, guest)) => (host, guest),
        None => (spec, spec),
    };
    if host.is_empty() || guest.is_empty() {
        bail!("--dir `{spec}` must be HOST or HOST::GUEST");
    }
    Ok(Preopen {
        host: PathBuf::from(host),
        guest: guest.to_string(),
        read_only: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunArgs,
    }

    fn parse(argv: &[&str]) -> RunArgs {
        let mut full = vec!["wasiboot"];
        full.extend_from_slice(argv);
        Harness::parse_from(full).run
    }

    #[test]
    fn test_parse_env() {
        assert_eq!(
            parse_env("LANG=C.UTF-8").unwrap(),
            ("LANG".to_string(), "C.UTF-8".to_string())
        );
        assert_eq!(parse_env("EMPTY=").unwrap().1, "");
        assert!(parse_env("NOVALUE").is_err());
        assert!(parse_env("=x").is_err());
    }

    #[test]
    fn test_parse_dir() {
        let same = parse_dir("/srv/www").unwrap();
        assert_eq!(same.host, PathBuf::from("/srv/www"));
        assert_eq!(same.guest, "/srv/www");

        let mapped = parse_dir(".::/data").unwrap();
        assert_eq!(mapped.host, PathBuf::from("."));
        assert_eq!(mapped.guest, "/data");

        assert!(parse_dir("::/data").is_err());
    }

    #[test]
    fn test_defaults_without_config() {
        let args = parse(&[]);
        let plan = build_plan(&BootConfig::default(), &args).unwrap();
        assert_eq!(
            plan.artifact,
            PathBuf::from("target/wasm32-wasi/release/idkhtml.wasm")
        );
        assert_eq!(plan.entry, "_start");
        assert_eq!(plan.warmup_iterations, 0);
        assert_eq!(plan.shim.args, vec!["idkhtml.wasm".to_string()]);
    }

    #[test]
    fn test_flags_override_config() {
        let config = BootConfig::from_toml_str(
            "[artifact]\npath = \"a.wasm\"\nentry = \"main\"\n\n[warmup]\niterations = 4\n",
        )
        .unwrap();
        let args = parse(&[
            "b.wasm",
            "--warmup",
            "1",
            "--stdout",
            "discard",
            "--env",
            "K=V",
            "--memory",
            "1MiB",
            "--",
            "--flag",
        ]);
        let plan = build_plan(&config, &args).unwrap();

        assert_eq!(plan.artifact, PathBuf::from("b.wasm"));
        assert_eq!(plan.entry, "main");
        assert_eq!(plan.warmup_iterations, 1);
        assert_eq!(plan.shim.stdout, OutputSink::Discard);
        assert_eq!(plan.shim.env, vec![("K".to_string(), "V".to_string())]);
        assert_eq!(plan.shim.memory_limit, 1024 * 1024);
        assert_eq!(plan.shim.args, vec!["b.wasm", "--flag"]);
    }

    #[test]
    fn test_capture_is_rejected_on_command_line() {
        let args = parse(&["--stdout", "capture"]);
        assert!(build_plan(&BootConfig::default(), &args).is_err());
    }

    #[test]
    fn test_capture_in_config_is_rejected() {
        let config = BootConfig::from_toml_str("[stdio]\nstderr = \"capture\"\n").unwrap();
        assert!(build_plan(&config, &parse(&[])).is_err());
        assert!(build_plan(&config, &parse(&["--stderr", "inherit"])).is_ok());
    }

    #[test]
    fn test_bad_memory_flag() {
        let args = parse(&["--memory", "plenty"]);
        assert!(build_plan(&BootConfig::default(), &args).is_err());
    }

    #[test]
    fn test_load_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[artifact]\npath = \"x.wasm\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.artifact_path(), PathBuf::from("x.wasm"));
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
