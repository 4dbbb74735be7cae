//! Content fingerprinting.
//!
//! Streams file content through SHA-256 in 1 MiB chunks so arbitrarily
//! large files never load fully into memory. Fingerprints are lowercase
//! hex and drive duplicate grouping.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

const CHUNK_SIZE: usize = 1024 * 1024;

/// Computes the SHA-256 fingerprint of a file.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
