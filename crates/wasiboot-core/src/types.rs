//! Shared types used across wasiboot crates.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where the `idkhtml` build drops its release artifact.
pub const DEFAULT_ARTIFACT_PATH: &str = "target/wasm32-wasi/release/idkhtml.wasm";

/// Entry point exported by WASI preview-1 commands.
pub const DEFAULT_ENTRY: &str = "_start";

/// Import namespace of the WASI preview-1 system-call surface.
pub const WASI_P1_MODULE: &str = "wasi_snapshot_preview1";

/// The stages of a bootstrap run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Load,
    Compile,
    Shim,
    Bind,
    Start,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Compile => "compile",
            Stage::Shim => "shim",
            Stage::Bind => "bind",
            Stage::Start => "start",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How the entry point handed control back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitStatus {
    /// The entry point returned normally.
    Returned,
    /// The guest called `proc_exit` with this code.
    Exited(i32),
}

impl ExitStatus {
    /// Process exit code equivalent: a normal return is 0.
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Returned => 0,
            ExitStatus::Exited(code) => *code,
        }
    }

    pub fn success(&self) -> bool {
        self.code() == 0
    }
}

/// Kind of an import or export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternKind {
    Func,
    Global,
    Memory,
    Table,
    Tag,
}

impl ExternKind {
    pub fn label(&self) -> &'static str {
        match self {
            ExternKind::Func => "func",
            ExternKind::Global => "global",
            ExternKind::Memory => "memory",
            ExternKind::Table => "table",
            ExternKind::Tag => "tag",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEntry {
    pub module: String,
    pub name: String,
    pub kind: ExternKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEntry {
    pub name: String,
    pub kind: ExternKind,
}

/// Static description of a compiled module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub name: String,
    pub path: Option<String>,
    pub size_bytes: usize,
    pub sha256: String,
    pub entry: String,
    pub has_entry: bool,
    pub imports: Vec<ImportEntry>,
    pub exports: Vec<ExportEntry>,
}

impl ModuleSummary {
    /// Names of the WASI preview-1 functions the module imports.
    pub fn wasi_imports(&self) -> Vec<&str> {
        self.imports
            .iter()
            .filter(|i| i.module == WASI_P1_MODULE)
            .map(|i| i.name.as_str())
            .collect()
    }

    /// Imports that fall outside the WASI preview-1 namespace.
    ///
    /// These can never be satisfied by the shim, so binding will fail.
    pub fn foreign_imports(&self) -> Vec<&ImportEntry> {
        self.imports
            .iter()
            .filter(|i| i.module != WASI_P1_MODULE)
            .collect()
    }
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Parse a byte size such as `65536`, `64KiB`, `256MiB` or `1GiB`.
pub fn parse_byte_size(input: &str) -> Option<usize> {
    let s = input.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, suffix) = s.split_at(split);
    let value: usize = digits.parse().ok()?;
    let multiplier: usize = match suffix.trim() {
        "" | "B" => 1,
        "KiB" | "K" | "KB" => 1024,
        "MiB" | "M" | "MB" => 1024 * 1024,
        "GiB" | "G" | "GB" => 1024 * 1024 * 1024,
        _ => return None,
    };
    value.checked_mul(multiplier)
}
