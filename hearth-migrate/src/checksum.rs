//! Content checksums for migration files.
//!
//! SHA-256 is used purely to detect edits to already-applied files. It is
//! not a tamper-proofing control: anyone able to edit a migration can also
//! edit the history table.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `content`.
pub fn checksum(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}
