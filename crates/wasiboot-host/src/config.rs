//! ShimConfig — what one WASI preview-1 shim exposes to its guest.
//!
//! The host's file-descriptor routing is carried here explicitly instead of
//! being read from process-global state, so several instances can run with
//! different routing (a quiet warm-up run next to a visible one).

use std::path::PathBuf;

use wasiboot_core::config::{BootConfig, InputRoute, OutputRoute};

use crate::limiter::{DEFAULT_MEMORY_LIMIT, DEFAULT_TABLE_LIMIT};

/// Default capacity of a captured output stream: 1 MiB.
pub const DEFAULT_CAPTURE_LIMIT: usize = 1024 * 1024;

/// Source of the guest's fd 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinSource {
    Inherit,
    /// Reads report end-of-file immediately.
    Null,
    Bytes(Vec<u8>),
}

/// Destination of the guest's fd 1 or fd 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSink {
    Inherit,
    /// Writes succeed and are dropped.
    Discard,
    /// Writes are buffered in memory, up to `limit` bytes.
    Capture { limit: usize },
}

impl From<OutputRoute> for OutputSink {
    fn from(route: OutputRoute) -> Self {
        match route {
            OutputRoute::Inherit => OutputSink::Inherit,
            OutputRoute::Discard => OutputSink::Discard,
            OutputRoute::Capture => OutputSink::Capture {
                limit: DEFAULT_CAPTURE_LIMIT,
            },
        }
    }
}

/// A host directory made visible to the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preopen {
    pub host: PathBuf,
    pub guest: String,
    pub read_only: bool,
}

/// Host-side shim configuration for a single instance.
#[derive(Debug, Clone)]
pub struct ShimConfig {
    pub stdin: StdinSource,
    pub stdout: OutputSink,
    pub stderr: OutputSink,
    /// Full argv, including the program name in position 0.
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Pass the host's environment through (explicit `env` entries win).
    pub inherit_env: bool,
    pub preopens: Vec<Preopen>,
    /// Linear memory cap in bytes.
    pub memory_limit: usize,
    pub table_limit: u32,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            stdin: StdinSource::Inherit,
            stdout: OutputSink::Inherit,
            stderr: OutputSink::Inherit,
            args: Vec::new(),
            env: Vec::new(),
            inherit_env: false,
            preopens: Vec::new(),
            memory_limit: DEFAULT_MEMORY_LIMIT,
            table_limit: DEFAULT_TABLE_LIMIT,
        }
    }
}

impl ShimConfig {
    /// A shim wired to the host's standard streams, with `program` as argv[0].
    pub fn for_program(program: &str) -> Self {
        Self {
            args: vec![program.to_string()],
            ..Self::default()
        }
    }

    /// A shim with no host-visible I/O at all: stdin is closed and both output
    /// streams are discarded.
    pub fn isolated(program: &str) -> Self {
        Self {
            stdin: StdinSource::Null,
            stdout: OutputSink::Discard,
            stderr: OutputSink::Discard,
            ..Self::for_program(program)
        }
    }

    /// Build a ShimConfig from the `[stdio]`, `[wasi]` and `[limits]` sections.
    pub fn from_boot_config(config: &BootConfig, program: &str) -> Self {
        let mut shim = Self::for_program(program);

        if let Some(stdio) = &config.stdio {
            if let Some(stdin) = stdio.stdin {
                shim.stdin = match stdin {
                    InputRoute::Inherit => StdinSource::Inherit,
                    InputRoute::Null => StdinSource::Null,
                };
            }
            if let Some(stdout) = stdio.stdout {
                shim.stdout = stdout.into();
            }
            if let Some(stderr) = stdio.stderr {
                shim.stderr = stderr.into();
            }
        }

        if let Some(wasi) = &config.wasi {
            if let Some(args) = &wasi.args {
                shim.args.extend(args.iter().cloned());
            }
            if let Some(env) = &wasi.env {
                shim.env = env.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            }
            shim.inherit_env = wasi.inherit_env.unwrap_or(false);
            if let Some(preopens) = &wasi.preopens {
                shim.preopens = preopens
                    .iter()
                    .map(|p| Preopen {
                        host: p.host.clone(),
                        guest: p.guest.clone(),
                        read_only: false,
                    })
                    .collect();
            }
        }

        if let Some(limit) = config.memory_limit() {
            shim.memory_limit = limit;
        }
        if let Some(limit) = config.table_limit() {
            shim.table_limit = limit;
        }

        shim
    }

    /// Builder method: route the guest's stdout.
    pub fn with_stdout(self, stdout: OutputSink) -> Self {
        Self { stdout, ..self }
    }

    /// Builder method: route the guest's stderr.
    pub fn with_stderr(self, stderr: OutputSink) -> Self {
        Self { stderr, ..self }
    }

    /// Builder method: feed fixed bytes to the guest's stdin.
    pub fn with_stdin_bytes(self, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            stdin: StdinSource::Bytes(bytes.into()),
            ..self
        }
    }

    /// Builder method: append arguments after argv[0].
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Builder method: set one environment variable, replacing an earlier value.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.env.retain(|(k, _)| *k != key);
        self.env.push((key, value.into()));
        self
    }

    /// Builder method: preopen a host directory.
    pub fn with_preopen(mut self, preopen: Preopen) -> Self {
        self.preopens.push(preopen);
        self
    }

    /// Builder method: cap linear memory.
    pub fn with_memory_limit(self, memory_limit: usize) -> Self {
        Self {
            memory_limit,
            ..self
        }
    }

    /// The guest's environ, in order.
    ///
    /// With `inherit_env` the `host` variables come first, minus any key that
    /// `env` sets; the explicit entries follow. A key never appears twice, so
    /// a first-match `getenv` sees the explicit value.
    pub fn guest_env<I>(&self, host: I) -> Vec<(String, String)>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut merged: Vec<(String, String)> = if self.inherit_env {
            host.into_iter()
                .filter(|(key, _)| !self.env.iter().any(|(k, _)| k == key))
                .collect()
        } else {
            Vec::new()
        };
        merged.extend(self.env.iter().cloned());
        merged
    }

    /// The same shim with both output streams discarded.
    ///
    /// Used for warm-up runs whose output must stay invisible.
    pub fn silenced(&self) -> Self {
        Self {
            stdout: OutputSink::Discard,
            stderr: OutputSink::Discard,
            ..self.clone()
        }
    }
}
