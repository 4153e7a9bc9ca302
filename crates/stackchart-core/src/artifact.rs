//! Rendered chart files

use sha2::{Digest, Sha256};

/// A chart file: a relative path (always `/`-separated) and its bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: String,
    pub content: Vec<u8>,
}

impl Artifact {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Content as UTF-8, if it is valid text
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }

    /// Hex SHA-256 of the content
    pub fn sha256(&self) -> String {
        hex::encode(Sha256::digest(&self.content))
    }
}

/// Digest over every artifact's path and content hash, in the given order
///
/// Two renders of the same configuration produce the same digest.
pub fn chart_digest(artifacts: &[Artifact]) -> String {
    let mut hasher = Sha256::new();
    for artifact in artifacts {
        hasher.update(artifact.path.as_bytes());
        hasher.update(b":");
        hasher.update(artifact.sha256().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
