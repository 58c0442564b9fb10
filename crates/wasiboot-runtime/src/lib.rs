//! wasiboot-runtime — the module bootstrapper.
//!
//! Loads a WASI preview-1 module from disk, compiles it, binds it to a fresh
//! capability shim and invokes its entry point once:
//!
//! - **Load**: `artifact::load` reads the bytes (`BootError::Io`)
//! - **Compile**: `Runtime::compile` validates and compiles (`BootError::Format`)
//! - **Bind**: `BoundInstance::bind` links against the shim (`BootError::Link`)
//! - **Start**: `BoundInstance::start` calls the entry point
//!
//! # Architecture
//!
//! ```text
//! Bootstrapper
//!   └── Runtime
//!       ├── BootEngine (shared wasmtime::Engine + preview-1 Linker)
//!       ├── CompiledModule cache (module name → Module)
//!       └── InstanceFactory per run
//!           └── BoundInstance (Store<HostState> + Instance), started once
//! ```

pub mod artifact;
pub mod bootstrap;
pub mod instance;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use wasiboot_core::{BootResult, ModuleSummary};
use wasiboot_host::{BootEngine, ShimConfig};

pub use artifact::ArtifactBytes;
pub use bootstrap::{BootPlan, Bootstrapper};
pub use instance::{BoundInstance, CompiledModule, InstanceFactory, RunOutcome};

/// Owns the engine and a cache of compiled modules.
pub struct Runtime {
    engine: BootEngine,
    /// Compiled module cache: name → compiled module.
    modules: Arc<Mutex<HashMap<String, CompiledModule>>>,
}

impl Runtime {
    /// Create a new runtime with default configuration.
    pub fn new() -> anyhow::Result<Self> {
        let engine = BootEngine::new()?;
        tracing::debug!("wasiboot runtime initialized");
        Ok(Self {
            engine,
            modules: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Get a reference to the underlying engine.
    pub fn engine(&self) -> &BootEngine {
        &self.engine
    }

    /// Compile an artifact and cache it under its name.
    pub async fn compile(&self, artifact: &ArtifactBytes) -> BootResult<CompiledModule> {
        let module = CompiledModule::from_artifact(self.engine.engine(), artifact)?;
        self.modules
            .lock()
            .await
            .insert(module.name().to_string(), module.clone());
        Ok(module)
    }

    /// Load and compile the artifact at `path`.
    pub async fn load_module(&self, path: &Path) -> BootResult<CompiledModule> {
        let artifact = artifact::load(path)?;
        self.compile(&artifact).await
    }

    /// Get a previously compiled module by name.
    pub async fn get_module(&self, name: &str) -> Option<CompiledModule> {
        self.modules.lock().await.get(name).cloned()
    }

    /// List all cached module names.
    pub async fn cached_modules(&self) -> Vec<String> {
        self.modules.lock().await.keys().cloned().collect()
    }

    /// Bind a compiled module to a fresh shim.
    pub async fn bind(
        &self,
        module: &CompiledModule,
        shim_config: &ShimConfig,
    ) -> BootResult<BoundInstance> {
        BoundInstance::bind(&self.engine, module, shim_config).await
    }

    /// Create an instance factory for a compiled module.
    pub fn factory(&self, module: CompiledModule) -> InstanceFactory {
        InstanceFactory::new(self.engine.clone(), module)
    }

    /// Load and compile `path`, then describe it against `entry`.
    pub async fn inspect(&self, path: &Path, entry: &str) -> BootResult<ModuleSummary> {
        let module = self.load_module(path).await?;
        Ok(module.summary(entry))
    }
}
