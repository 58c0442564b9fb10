//! Artifact loading — the first stage of a bootstrap run.

use std::path::{Path, PathBuf};

use wasiboot_core::{BootError, BootResult, sha256_hex};

/// Raw bytes of a module artifact, as read from disk.
#[derive(Debug, Clone)]
pub struct ArtifactBytes {
    name: String,
    path: Option<PathBuf>,
    bytes: Vec<u8>,
    sha256: String,
}

impl ArtifactBytes {
    /// Wrap bytes that did not come from a file.
    pub fn from_bytes(name: &str, bytes: Vec<u8>) -> Self {
        let sha256 = sha256_hex(&bytes);
        Self {
            name: name.to_string(),
            path: None,
            bytes,
            sha256,
        }
    }

    /// Module name: the file name of the artifact, or the name it was given.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex SHA-256 of the raw bytes.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}

/// Read the artifact at `path`.
///
/// A missing or unreadable file is a `BootError::Io`; nothing downstream is
/// attempted.
pub fn load(path: &Path) -> BootResult<ArtifactBytes> {
    let bytes = std::fs::read(path).map_err(|e| BootError::io(path, e))?;
    let name = artifact_name(path);
    let sha256 = sha256_hex(&bytes);

    tracing::info!(
        path = %path.display(),
        size = bytes.len(),
        %sha256,
        "loaded wasm artifact"
    );

    Ok(ArtifactBytes {
        name,
        path: Some(path.to_path_buf()),
        bytes,
        sha256,
    })
}

/// Program name for an artifact path, used for logging and as argv[0].
pub fn artifact_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_bytes_and_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.bin");
        std::fs::write(&path, b"\0asm\x01\0\0\0").unwrap();

        let artifact = load(&path).unwrap();
        assert_eq!(artifact.name(), "artifact.bin");
        assert_eq!(artifact.len(), 8);
        assert_eq!(artifact.path(), Some(path.as_path()));
        assert_eq!(artifact.sha256(), sha256_hex(b"\0asm\x01\0\0\0"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("missing.wasm")).unwrap_err();
        match err {
            BootError::Io { path, source } => {
                assert!(path.ends_with("missing.wasm"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn artifact_name_uses_file_name() {
        assert_eq!(
            artifact_name(Path::new("target/wasm32-wasi/release/idkhtml.wasm")),
            "idkhtml.wasm"
        );
    }
}
