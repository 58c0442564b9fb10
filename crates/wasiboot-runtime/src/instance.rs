//! CompiledModule and BoundInstance — the compile, bind and start stages.
//!
//! A `CompiledModule` wraps a `wasmtime::Module` and is cheap to clone.
//! A `BoundInstance` is one `Store<HostState>` plus the instance linked
//! against that store's shim; it is started at most once. A guest may also
//! exit from its start section, in which case the binding already carries the
//! exit status and `start` reports it without calling the entry point.

use std::path::PathBuf;

use wasmtime::{Engine, ExternType, Instance, Module, Store};
use wasmtime_wasi::I32Exit;

use wasiboot_core::{
    BootError, BootResult, ExitStatus, ExportEntry, ExternKind, ImportEntry, ModuleSummary,
    sha256_hex,
};
use wasiboot_host::{BootEngine, HostState, ShimConfig};

use crate::artifact::ArtifactBytes;

/// A compiled wasm module, ready to be bound.
///
/// Modules are expensive to compile but cheap to instantiate.
#[derive(Clone)]
pub struct CompiledModule {
    module: Module,
    name: String,
    path: Option<PathBuf>,
    size_bytes: usize,
    sha256: String,
}

impl CompiledModule {
    /// Compile an artifact's bytes.
    ///
    /// Only the binary encoding is accepted; anything else (including the
    /// text format) is a `BootError::Format`.
    pub fn from_artifact(engine: &Engine, artifact: &ArtifactBytes) -> BootResult<Self> {
        let module =
            Module::from_binary(engine, artifact.bytes()).map_err(|e| BootError::Format {
                name: artifact.name().to_string(),
                reason: format!("{e:#}"),
            })?;
        tracing::info!(name = %artifact.name(), "compiled wasm module");
        Ok(Self {
            module,
            name: artifact.name().to_string(),
            path: artifact.path().map(|p| p.to_path_buf()),
            size_bytes: artifact.len(),
            sha256: artifact.sha256().to_string(),
        })
    }

    /// Compile a module from raw bytes.
    pub fn from_bytes(engine: &Engine, name: &str, bytes: &[u8]) -> BootResult<Self> {
        Self::from_artifact(engine, &ArtifactBytes::from_bytes(name, bytes.to_vec()))
    }

    /// The module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Access the underlying module.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Hex SHA-256 of the source bytes.
    pub fn source_sha256(&self) -> &str {
        &self.sha256
    }

    pub fn imports(&self) -> Vec<ImportEntry> {
        self.module
            .imports()
            .map(|i| ImportEntry {
                module: i.module().to_string(),
                name: i.name().to_string(),
                kind: extern_kind(&i.ty()),
            })
            .collect()
    }

    pub fn exports(&self) -> Vec<ExportEntry> {
        self.module
            .exports()
            .map(|e| ExportEntry {
                name: e.name().to_string(),
                kind: extern_kind(&e.ty()),
            })
            .collect()
    }

    /// Whether `entry` is exported as a function.
    pub fn exports_func(&self, entry: &str) -> bool {
        matches!(self.module.get_export(entry), Some(ExternType::Func(_)))
    }

    /// The compiled machine code in Wasmtime's serialized form.
    pub fn serialize(&self) -> anyhow::Result<Vec<u8>> {
        self.module.serialize()
    }

    /// Hex SHA-256 of the serialized compiled code.
    ///
    /// Compiling the same bytes with the same engine settings yields the same
    /// fingerprint.
    pub fn fingerprint(&self) -> anyhow::Result<String> {
        Ok(sha256_hex(&self.serialize()?))
    }

    /// Static description of this module against an entry point name.
    pub fn summary(&self, entry: &str) -> ModuleSummary {
        ModuleSummary {
            name: self.name.clone(),
            path: self.path.as_ref().map(|p| p.display().to_string()),
            size_bytes: self.size_bytes,
            sha256: self.sha256.clone(),
            entry: entry.to_string(),
            has_entry: self.exports_func(entry),
            imports: self.imports(),
            exports: self.exports(),
        }
    }
}

fn extern_kind(ty: &ExternType) -> ExternKind {
    match ty {
        ExternType::Func(_) => ExternKind::Func,
        ExternType::Global(_) => ExternKind::Global,
        ExternType::Memory(_) => ExternKind::Memory,
        ExternType::Table(_) => ExternKind::Table,
        _ => ExternKind::Tag,
    }
}

/// What a finished instance left behind.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: ExitStatus,
    /// Guest stdout, when the shim captured it.
    pub stdout: Option<Vec<u8>>,
    /// Guest stderr, when the shim captured it.
    pub stderr: Option<Vec<u8>>,
    /// Linear memory high-water mark in bytes.
    pub memory_used: usize,
    /// Memory or table growth requests the limiter refused.
    pub growth_denied: u32,
}

/// A module instance bound to its own freshly constructed shim.
pub struct BoundInstance {
    store: Store<HostState>,
    binding: Binding,
    module_name: String,
}

enum Binding {
    Ready(Instance),
    /// The start section called `proc_exit`.
    Exited(i32),
}

impl BoundInstance {
    /// Construct a shim from `shim_config` and bind `module` against it.
    ///
    /// Every import must be satisfied by name and signature, otherwise this
    /// fails with `BootError::Link` before any guest code runs.
    pub async fn bind(
        engine: &BootEngine,
        module: &CompiledModule,
        shim_config: &ShimConfig,
    ) -> BootResult<Self> {
        let mut store = engine.new_store(shim_config)?;

        let pre = engine
            .linker()
            .instantiate_pre(&module.module)
            .map_err(|e| BootError::Link {
                name: module.name.clone(),
                reason: format!("{e:#}"),
            })?;

        let binding = match pre.instantiate_async(&mut store).await {
            Ok(instance) => {
                tracing::info!(name = %module.name, "wasm instance bound");
                Binding::Ready(instance)
            }
            Err(e) => match e.downcast_ref::<I32Exit>() {
                Some(exit) => {
                    tracing::info!(
                        name = %module.name,
                        code = exit.0,
                        "guest exited during instantiation"
                    );
                    Binding::Exited(exit.0)
                }
                None => {
                    return Err(BootError::Instantiate {
                        name: module.name.clone(),
                        reason: format!("{e:#}"),
                    });
                }
            },
        };

        Ok(Self {
            store,
            binding,
            module_name: module.name.clone(),
        })
    }

    /// The module name this instance was created from.
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Get a reference to the store.
    pub fn store(&self) -> &Store<HostState> {
        &self.store
    }

    /// Invoke `entry` once and hand control to the guest.
    ///
    /// A `proc_exit` call is reported as `ExitStatus::Exited`; any other guest
    /// failure is passed through as `BootError::Trap`. If the guest already
    /// exited while binding, `entry` is not looked up and that exit is returned.
    pub async fn start(mut self, entry: &str) -> BootResult<RunOutcome> {
        let instance = match self.binding {
            Binding::Ready(instance) => instance,
            Binding::Exited(code) => return Ok(self.finish(ExitStatus::Exited(code))),
        };

        let func = instance
            .get_func(&mut self.store, entry)
            .ok_or_else(|| BootError::MissingEntry {
                name: self.module_name.clone(),
                entry: entry.to_string(),
            })?;
        let func = func
            .typed::<(), ()>(&self.store)
            .map_err(|e| BootError::Link {
                name: self.module_name.clone(),
                reason: format!("entry point `{entry}`: {e:#}"),
            })?;

        tracing::info!(name = %self.module_name, %entry, "invoking entry point");

        let status = match func.call_async(&mut self.store, ()).await {
            Ok(()) => ExitStatus::Returned,
            Err(e) => match e.downcast_ref::<I32Exit>() {
                Some(exit) => ExitStatus::Exited(exit.0),
                None => {
                    tracing::warn!(name = %self.module_name, error = %e, "guest trapped");
                    return Err(BootError::Trap {
                        name: self.module_name,
                        reason: format!("{e:#}"),
                    });
                }
            },
        };

        let limiter = &self.store.data().limiter;
        tracing::info!(
            name = %self.module_name,
            code = status.code(),
            memory_used = limiter.memory_used(),
            memory_headroom = limiter.memory_headroom(),
            "guest finished"
        );
        Ok(self.finish(status))
    }

    /// Whether the guest exited before its entry point could be called.
    pub fn exited_during_bind(&self) -> Option<i32> {
        match self.binding {
            Binding::Exited(code) => Some(code),
            Binding::Ready(_) => None,
        }
    }

    fn finish(&self, status: ExitStatus) -> RunOutcome {
        let state = self.store.data();
        RunOutcome {
            status,
            stdout: state.captured_stdout(),
            stderr: state.captured_stderr(),
            memory_used: state.limiter.memory_used(),
            growth_denied: state.limiter.denials(),
        }
    }
}

/// Shared handle to the engine plus one compiled module.
///
/// Every `bind` constructs a new shim, so instances never share WASI state.
#[derive(Clone)]
pub struct InstanceFactory {
    engine: BootEngine,
    module: CompiledModule,
}

impl InstanceFactory {
    pub fn new(engine: BootEngine, module: CompiledModule) -> Self {
        Self { engine, module }
    }

    /// Bind a fresh instance with the given shim config.
    pub async fn bind(&self, shim_config: &ShimConfig) -> BootResult<BoundInstance> {
        BoundInstance::bind(&self.engine, &self.module, shim_config).await
    }

    /// Bind a fresh instance and start it.
    pub async fn run(&self, shim_config: &ShimConfig, entry: &str) -> BootResult<RunOutcome> {
        self.bind(shim_config).await?.start(entry).await
    }

    /// The compiled module this factory produces instances of.
    pub fn module(&self) -> &CompiledModule {
        &self.module
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> BootEngine {
        BootEngine::new().unwrap()
    }

    #[test]
    fn rejects_garbage_bytes() {
        let engine = engine();
        let err = CompiledModule::from_bytes(engine.engine(), "junk", b"not wasm").err().unwrap();
        assert!(matches!(err, BootError::Format { .. }));
    }

    #[test]
    fn rejects_text_format() {
        let engine = engine();
        let err = CompiledModule::from_bytes(engine.engine(), "text", b"(module)").err().unwrap();
        assert!(matches!(err, BootError::Format { .. }));
    }

    #[test]
    fn lists_imports_and_exports() {
        let engine = engine();
        let wasm = wat::parse_str(
            r#"(module
                (import "wasi_snapshot_preview1" "proc_exit" (func (param i32)))
                (memory (export "memory") 1)
                (func (export "_start")))"#,
        )
        .unwrap();
        let module = CompiledModule::from_bytes(engine.engine(), "m", &wasm).unwrap();

        let imports = module.imports();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].name, "proc_exit");
        assert_eq!(imports[0].kind, ExternKind::Func);

        let summary = module.summary("_start");
        assert!(summary.has_entry);
        assert_eq!(summary.exports.len(), 2);
        assert_eq!(summary.wasi_imports(), vec!["proc_exit"]);
        assert!(!module.exports_func("memory"));
        assert!(!module.summary("main").has_entry);
    }

    #[tokio::test]
    async fn missing_entry_is_reported() {
        let engine = engine();
        let wasm = wat::parse_str(r#"(module (func (export "main")))"#).unwrap();
        let module = CompiledModule::from_bytes(engine.engine(), "m", &wasm).unwrap();

        let instance = BoundInstance::bind(&engine, &module, &ShimConfig::isolated("m"))
            .await
            .unwrap();
        let err = instance.start("_start").await.unwrap_err();
        assert!(matches!(err, BootError::MissingEntry { .. }));
    }

    #[tokio::test]
    async fn start_section_exit_is_kept_on_the_binding() {
        let engine = engine();
        let wasm = wat::parse_str(
            r#"(module
                (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
                (memory (export "memory") 1)
                (func $init (call $exit (i32.const 9)))
                (start $init))"#,
        )
        .unwrap();
        let module = CompiledModule::from_bytes(engine.engine(), "m", &wasm).unwrap();

        let instance = BoundInstance::bind(&engine, &module, &ShimConfig::isolated("m"))
            .await
            .unwrap();
        assert_eq!(instance.exited_during_bind(), Some(9));

        // No `_start` export: the entry is never looked up.
        let outcome = instance.start("_start").await.unwrap();
        assert_eq!(outcome.status, ExitStatus::Exited(9));
    }

    #[tokio::test]
    async fn entry_with_wrong_signature_is_a_link_error() {
        let engine = engine();
        let wasm =
            wat::parse_str(r#"(module (func (export "_start") (result i32) i32.const 1))"#)
                .unwrap();
        let module = CompiledModule::from_bytes(engine.engine(), "m", &wasm).unwrap();

        let err = InstanceFactory::new(engine, module)
            .run(&ShimConfig::isolated("m"), "_start")
            .await
            .unwrap_err();
        assert!(matches!(err, BootError::Link { .. }));
    }
}
