//! BootEngine — the Wasmtime engine and WASI preview-1 linker.
//!
//! # Architecture
//!
//! The engine creates one `wasmtime::Engine` configured for async execution
//! and one `Linker<HostState>` with the whole `wasi_snapshot_preview1`
//! namespace registered. Both are shared by every instance.
//!
//! `HostState` is the per-instance store data: a fresh `WasiP1Ctx` built from
//! a `ShimConfig`, the instance's resource limiter, and handles to any output
//! stream the config asked to capture.

use std::sync::Arc;

use wasmtime::{Config, Engine, Linker, Store};
use wasmtime_wasi::filesystem::{DirPerms, FilePerms};
use wasmtime_wasi::p1::{self, WasiP1Ctx};
use wasmtime_wasi::p2::pipe::{MemoryInputPipe, MemoryOutputPipe};
use wasmtime_wasi::WasiCtxBuilder;

use wasiboot_core::{BootError, BootResult};

use crate::config::{OutputSink, ShimConfig, StdinSource};
use crate::limiter::BootLimiter;

/// Per-instance host state.
pub struct HostState {
    pub wasi: WasiP1Ctx,
    pub limiter: BootLimiter,
    /// Set when stdout is routed to `OutputSink::Capture`.
    pub stdout: Option<MemoryOutputPipe>,
    /// Set when stderr is routed to `OutputSink::Capture`.
    pub stderr: Option<MemoryOutputPipe>,
}

impl HostState {
    /// Bytes the guest has written to a captured stdout so far.
    pub fn captured_stdout(&self) -> Option<Vec<u8>> {
        self.stdout.as_ref().map(|pipe| pipe.contents().to_vec())
    }

    /// Bytes the guest has written to a captured stderr so far.
    pub fn captured_stderr(&self) -> Option<Vec<u8>> {
        self.stderr.as_ref().map(|pipe| pipe.contents().to_vec())
    }
}

/// The engine that configures Wasmtime and owns the preview-1 linker.
///
/// `BootEngine` is cheap to clone (holds `Arc` references internally).
#[derive(Clone)]
pub struct BootEngine {
    engine: Engine,
    linker: Arc<Linker<HostState>>,
}

impl BootEngine {
    /// Create a new `BootEngine` with async support and WASI preview-1 linked.
    pub fn new() -> anyhow::Result<Self> {
        let mut config = Config::new();
        config.async_support(true);

        let engine = Engine::new(&config)?;
        let mut linker = Linker::new(&engine);
        p1::add_to_linker_async(&mut linker, |state: &mut HostState| &mut state.wasi)?;

        tracing::debug!("wasi preview-1 linker ready");

        Ok(Self {
            engine,
            linker: Arc::new(linker),
        })
    }

    /// Get a reference to the underlying `wasmtime::Engine`.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Get a reference to the configured `Linker`.
    pub fn linker(&self) -> &Linker<HostState> {
        &self.linker
    }

    /// Construct a fresh capability shim from a `ShimConfig`.
    pub fn build_host_state(&self, config: &ShimConfig) -> BootResult<HostState> {
        let mut builder = WasiCtxBuilder::new();

        match &config.stdin {
            StdinSource::Inherit => {
                builder.inherit_stdin();
            }
            StdinSource::Null => {}
            StdinSource::Bytes(bytes) => {
                builder.stdin(MemoryInputPipe::new(bytes.clone()));
            }
        }

        let stdout = match config.stdout {
            OutputSink::Inherit => {
                builder.inherit_stdout();
                None
            }
            OutputSink::Discard => None,
            OutputSink::Capture { limit } => {
                let pipe = MemoryOutputPipe::new(limit);
                builder.stdout(pipe.clone());
                Some(pipe)
            }
        };

        let stderr = match config.stderr {
            OutputSink::Inherit => {
                builder.inherit_stderr();
                None
            }
            OutputSink::Discard => None,
            OutputSink::Capture { limit } => {
                let pipe = MemoryOutputPipe::new(limit);
                builder.stderr(pipe.clone());
                Some(pipe)
            }
        };

        builder.args(config.args.as_slice());
        // Non-UTF-8 host variables cannot be expressed in preview-1 environ.
        let host_env = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
        let env = config.guest_env(host_env);
        builder.envs(env.as_slice());

        for preopen in &config.preopens {
            std::fs::metadata(&preopen.host).map_err(|e| BootError::io(&preopen.host, e))?;
            let (dir_perms, file_perms) = if preopen.read_only {
                (DirPerms::READ, FilePerms::READ)
            } else {
                (DirPerms::all(), FilePerms::all())
            };
            builder
                .preopened_dir(&preopen.host, &preopen.guest, dir_perms, file_perms)
                .map_err(|e| {
                    BootError::Config(format!(
                        "cannot preopen {} as {}: {e}",
                        preopen.host.display(),
                        preopen.guest
                    ))
                })?;
        }

        tracing::debug!(
            args = config.args.len(),
            env = env.len(),
            preopens = config.preopens.len(),
            stdout = ?config.stdout,
            "wasi shim constructed"
        );

        Ok(HostState {
            wasi: builder.build_p1(),
            limiter: BootLimiter::new(config.memory_limit, config.table_limit),
            stdout,
            stderr,
        })
    }

    /// Build a shim and wrap it in a store with its limiter installed.
    pub fn new_store(&self, config: &ShimConfig) -> BootResult<Store<HostState>> {
        let host_state = self.build_host_state(config)?;
        let mut store = Store::new(&self.engine, host_state);
        store.limiter(|state| &mut state.limiter);
        Ok(store)
    }
}
