//! Content digests for source references
//!
//! A source file's reference id is the hex SHA-256 of its bytes, so two files
//! with identical content share one id.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{GatewayError, Result};

/// Computes a stable digest for file content
pub trait ContentHasher: Send + Sync {
    /// Digest a byte slice into a lowercase hex string
    fn digest(&self, bytes: &[u8]) -> String;

    /// Digest a file's contents.
    ///
    /// The default reads the whole file; implementations may stream.
    fn digest_file(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path).map_err(|e| {
            GatewayError::io(format!("Failed to read file for hashing: {}", path.display()), e)
        })?;
        Ok(self.digest(&bytes))
    }
}

/// SHA-256 content hasher
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn digest(&self, bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    fn digest_file(&self, path: &Path) -> Result<String> {
        let mut file = File::open(path).map_err(|e| {
            GatewayError::io(format!("Failed to open file for hashing: {}", path.display()), e)
        })?;

        let mut hasher = Sha256::new();
        let mut buffer = [0; 8192]; // 8KB buffer for streaming

        loop {
            let bytes_read = file.read(&mut buffer).map_err(|e| {
                GatewayError::io(format!("Failed to read file for hashing: {}", path.display()), e)
            })?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }
}
