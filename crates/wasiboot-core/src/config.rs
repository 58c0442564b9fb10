//! wasiboot.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{BootError, BootResult};
use crate::types::{DEFAULT_ARTIFACT_PATH, DEFAULT_ENTRY, parse_byte_size};

/// Conventional config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "wasiboot.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootConfig {
    pub artifact: Option<ArtifactConfig>,
    pub stdio: Option<StdioConfig>,
    pub wasi: Option<WasiConfig>,
    pub limits: Option<LimitsConfig>,
    pub warmup: Option<WarmupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub path: Option<PathBuf>,
    pub entry: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StdioConfig {
    pub stdin: Option<InputRoute>,
    pub stdout: Option<OutputRoute>,
    pub stderr: Option<OutputRoute>,
}

/// Where the guest's standard input comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputRoute {
    Inherit,
    Null,
}

/// Where a guest output stream goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputRoute {
    Inherit,
    Discard,
    Capture,
}

impl std::str::FromStr for OutputRoute {
    type Err = BootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inherit" => Ok(OutputRoute::Inherit),
            "discard" => Ok(OutputRoute::Discard),
            "capture" => Ok(OutputRoute::Capture),
            other => Err(BootError::Config(format!(
                "unknown output route `{other}` (expected inherit, discard or capture)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WasiConfig {
    pub args: Option<Vec<String>>,
    pub inherit_env: Option<bool>,
    pub env: Option<BTreeMap<String, String>>,
    pub preopens: Option<Vec<PreopenConfig>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreopenConfig {
    pub host: PathBuf,
    pub guest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub memory: Option<String>,
    pub table_elements: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupConfig {
    pub iterations: Option<u32>,
}

impl BootConfig {
    pub fn from_file(path: &Path) -> BootResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BootError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> BootResult<Self> {
        let config: BootConfig =
            toml::from_str(content).map_err(|e| BootError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load `wasiboot.toml` from `dir` if it exists, otherwise the defaults.
    pub fn discover(dir: &Path) -> BootResult<Self> {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            Self::from_file(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> BootResult<()> {
        if let Some(memory) = self.limits.as_ref().and_then(|l| l.memory.as_deref()) {
            if parse_byte_size(memory).is_none() {
                return Err(BootError::Config(format!(
                    "limits.memory `{memory}` is not a byte size"
                )));
            }
        }
        if let Some(entry) = self.artifact.as_ref().and_then(|a| a.entry.as_deref()) {
            if entry.is_empty() {
                return Err(BootError::Config("artifact.entry must not be empty".into()));
            }
        }
        Ok(())
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.artifact
            .as_ref()
            .and_then(|a| a.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_PATH))
    }

    pub fn entry(&self) -> String {
        self.artifact
            .as_ref()
            .and_then(|a| a.entry.clone())
            .unwrap_or_else(|| DEFAULT_ENTRY.to_string())
    }

    /// Configured memory limit in bytes, if any. Validated at parse time.
    pub fn memory_limit(&self) -> Option<usize> {
        self.limits
            .as_ref()
            .and_then(|l| l.memory.as_deref())
            .and_then(parse_byte_size)
    }

    pub fn table_limit(&self) -> Option<u32> {
        self.limits.as_ref().and_then(|l| l.table_elements)
    }

    pub fn warmup_iterations(&self) -> u32 {
        self.warmup
            .as_ref()
            .and_then(|w| w.iterations)
            .unwrap_or(0)
    }

    /// Scaffold a config pointing at `artifact` with every section spelled out.
    pub fn scaffold(artifact: &str) -> Self {
        BootConfig {
            artifact: Some(ArtifactConfig {
                path: Some(PathBuf::from(artifact)),
                entry: Some(DEFAULT_ENTRY.to_string()),
            }),
            stdio: Some(StdioConfig {
                stdin: Some(InputRoute::Inherit),
                stdout: Some(OutputRoute::Inherit),
                stderr: Some(OutputRoute::Inherit),
            }),
            wasi: Some(WasiConfig {
                args: Some(Vec::new()),
                inherit_env: Some(false),
                env: None,
                preopens: None,
            }),
            limits: Some(LimitsConfig {
                memory: Some("256MiB".to_string()),
                table_elements: Some(10_000),
            }),
            warmup: Some(WarmupConfig {
                iterations: Some(0),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold_round_trips() {
        let config = BootConfig::scaffold("build/app.wasm");
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("build/app.wasm"));
        assert!(toml_str.contains("256MiB"));

        let parsed = BootConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed.artifact_path(), PathBuf::from("build/app.wasm"));
        assert_eq!(parsed.memory_limit(), Some(256 * 1024 * 1024));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = BootConfig::from_toml_str("").unwrap();
        assert_eq!(config.artifact_path(), PathBuf::from(DEFAULT_ARTIFACT_PATH));
        assert_eq!(config.entry(), "_start");
        assert_eq!(config.warmup_iterations(), 0);
        assert_eq!(config.memory_limit(), None);
    }

    #[test]
    fn test_parse_full() {
        let toml_str = r#"
[artifact]
path = "out/main.wasm"
entry = "main"

[stdio]
stdin = "null"
stdout = "discard"

[wasi]
args = ["--verbose"]
inherit_env = true
env = { LANG = "C" }
preopens = [{ host = "/tmp", guest = "/data" }]

[limits]
memory = "64MiB"
table_elements = 500

[warmup]
iterations = 4
"#;
        let config = BootConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.entry(), "main");
        assert_eq!(config.warmup_iterations(), 4);
        assert_eq!(config.table_limit(), Some(500));

        let stdio = config.stdio.unwrap();
        assert_eq!(stdio.stdin, Some(InputRoute::Null));
        assert_eq!(stdio.stdout, Some(OutputRoute::Discard));
        assert_eq!(stdio.stderr, None);

        let wasi = config.wasi.unwrap();
        assert_eq!(wasi.env.unwrap().get("LANG").map(String::as_str), Some("C"));
        assert_eq!(wasi.preopens.unwrap()[0].guest, "/data");
    }

    #[test]
    fn test_rejects_bad_memory_size() {
        let err = BootConfig::from_toml_str("[limits]\nmemory = \"lots\"\n").unwrap_err();
        assert!(matches!(err, BootError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_route() {
        let err = BootConfig::from_toml_str("[stdio]\nstdout = \"fd3\"\n").unwrap_err();
        assert!(matches!(err, BootError::Config(_)));
        assert!("fd3".parse::<OutputRoute>().is_err());
        assert_eq!("discard".parse::<OutputRoute>().unwrap(), OutputRoute::Discard);
    }

    #[test]
    fn test_discover_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BootConfig::discover(dir.path()).unwrap();
        assert!(config.artifact.is_none());

        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[artifact]\npath = \"a.wasm\"\n",
        )
        .unwrap();
        let config = BootConfig::discover(dir.path()).unwrap();
        assert_eq!(config.artifact_path(), PathBuf::from("a.wasm"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = BootConfig::from_file(Path::new("/nonexistent/wasiboot.toml")).unwrap_err();
        assert!(matches!(err, BootError::Io { .. }));
    }
}
