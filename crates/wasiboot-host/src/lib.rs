//! wasiboot-host — Wasmtime host side of the bootstrapper.
//!
//! - **config**: `ShimConfig`, the explicit description of one WASI shim
//!   (standard stream routing, argv, environment, preopened directories)
//! - **engine**: `BootEngine`, the shared Wasmtime engine and preview-1 linker,
//!   and `HostState`, the per-instance store data
//! - **limiter**: `BootLimiter`, memory and table caps for a single instance

pub mod config;
pub mod engine;
pub mod limiter;

pub use config::{OutputSink, Preopen, ShimConfig, StdinSource};
pub use engine::{BootEngine, HostState};
pub use limiter::BootLimiter;
