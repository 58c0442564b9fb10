//! Bootstrapper — one full load, compile, bind, start sequence.
//!
//! Optionally runs a number of warm-up instances of the same compiled module
//! first. Each warm-up instance gets its own silenced shim, so its output
//! never reaches the host's visible streams and it shares no WASI state with
//! the real run.

use std::path::PathBuf;

use tracing::{debug, info};

use wasiboot_core::{BootConfig, BootResult, DEFAULT_ENTRY};
use wasiboot_host::ShimConfig;

use crate::artifact::{self, artifact_name};
use crate::instance::{InstanceFactory, RunOutcome};
use crate::Runtime;

/// Everything a single bootstrap run needs.
#[derive(Debug, Clone)]
pub struct BootPlan {
    pub artifact: PathBuf,
    pub entry: String,
    pub shim: ShimConfig,
    /// Silenced runs to perform before the real one.
    pub warmup_iterations: u32,
}

impl BootPlan {
    /// A plan for `artifact` with stdio wired to the host and no warm-up.
    pub fn new(artifact: impl Into<PathBuf>) -> Self {
        let artifact = artifact.into();
        let shim = ShimConfig::for_program(&artifact_name(&artifact));
        Self {
            artifact,
            entry: DEFAULT_ENTRY.to_string(),
            shim,
            warmup_iterations: 0,
        }
    }

    /// Build a plan from a parsed `wasiboot.toml`.
    pub fn from_config(config: &BootConfig) -> Self {
        let artifact = config.artifact_path();
        let shim = ShimConfig::from_boot_config(config, &artifact_name(&artifact));
        Self {
            artifact,
            entry: config.entry(),
            shim,
            warmup_iterations: config.warmup_iterations(),
        }
    }

    /// Builder method: replace the shim config.
    pub fn with_shim(self, shim: ShimConfig) -> Self {
        Self { shim, ..self }
    }

    /// Builder method: set the number of warm-up runs.
    pub fn with_warmup(self, warmup_iterations: u32) -> Self {
        Self {
            warmup_iterations,
            ..self
        }
    }

    /// Builder method: set the entry point export.
    pub fn with_entry(self, entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            ..self
        }
    }
}

/// Drives a `BootPlan` through every stage, aborting at the first failure.
pub struct Bootstrapper {
    runtime: Runtime,
}

impl Bootstrapper {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self::with_runtime(Runtime::new()?))
    }

    pub fn with_runtime(runtime: Runtime) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Load, compile, warm up, bind and start.
    pub async fn run(&self, plan: &BootPlan) -> BootResult<RunOutcome> {
        let artifact = artifact::load(&plan.artifact)?;
        let module = self.runtime.compile(&artifact).await?;
        let factory = self.runtime.factory(module);

        self.warm_up(&factory, plan).await?;

        let outcome = factory.run(&plan.shim, &plan.entry).await?;
        info!(
            name = %factory.module().name(),
            code = outcome.status.code(),
            "bootstrap complete"
        );
        Ok(outcome)
    }

    /// Run `plan.warmup_iterations` silenced instances to completion.
    ///
    /// Returns each warm-up outcome. Their `stdout`/`stderr` are always
    /// `None`, since nothing a warm-up guest writes is kept.
    pub async fn warm_up(
        &self,
        factory: &InstanceFactory,
        plan: &BootPlan,
    ) -> BootResult<Vec<RunOutcome>> {
        if plan.warmup_iterations == 0 {
            return Ok(Vec::new());
        }

        let quiet = plan.shim.silenced();
        let mut outcomes = Vec::with_capacity(plan.warmup_iterations as usize);
        for iteration in 0..plan.warmup_iterations {
            let outcome = factory.run(&quiet, &plan.entry).await?;
            debug!(iteration, code = outcome.status.code(), "warm-up run finished");
            outcomes.push(outcome);
        }

        info!(
            name = %factory.module().name(),
            runs = plan.warmup_iterations,
            "warm-up complete"
        );
        Ok(outcomes)
    }
}
