//! Error types for the module bootstrapper.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Stage;

/// Result type alias for bootstrapper operations.
pub type BootResult<T> = Result<T, BootError>;

/// Errors that abort a bootstrap run.
///
/// Every variant is fatal: the bootstrapper never retries a stage.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{name}` is not a valid wasm module: {reason}")]
    Format { name: String, reason: String },

    #[error("failed to link `{name}`: {reason}")]
    Link { name: String, reason: String },

    #[error("failed to instantiate `{name}`: {reason}")]
    Instantiate { name: String, reason: String },

    #[error("`{name}` does not export entry point `{entry}`")]
    MissingEntry { name: String, entry: String },

    #[error("`{name}` trapped: {reason}")]
    Trap { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BootError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BootError::Io {
            path: path.into(),
            source,
        }
    }

    /// The bootstrap stage this error aborted.
    pub fn stage(&self) -> Stage {
        match self {
            BootError::Io { .. } => Stage::Load,
            BootError::Format { .. } => Stage::Compile,
            BootError::Config(_) => Stage::Shim,
            BootError::Link { .. } | BootError::Instantiate { .. } => Stage::Bind,
            BootError::MissingEntry { .. } | BootError::Trap { .. } => Stage::Start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_path() {
        let err = BootError::io(
            "artifact.bin",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert_eq!(err.stage(), Stage::Load);
        assert!(err.to_string().contains("artifact.bin"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn stages_follow_the_pipeline() {
        let link = BootError::Link {
            name: "m".into(),
            reason: "unknown import".into(),
        };
        let trap = BootError::Trap {
            name: "m".into(),
            reason: "unreachable".into(),
        };
        assert_eq!(link.stage(), Stage::Bind);
        assert_eq!(trap.stage(), Stage::Start);
        assert!(Stage::Bind > Stage::Compile);
    }
}
