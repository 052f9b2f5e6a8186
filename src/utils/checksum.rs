// SPDX-License-Identifier: GPL-3.0-only
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of a byte slice
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
