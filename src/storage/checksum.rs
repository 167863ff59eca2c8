//! Checksum helper shared by the WAL, KV segment files and backup
//! manifests. CRC32C only; no "None" escape hatch, since every on-disk
//! record in this crate asks for integrity checking.

use crate::error::{DbError, Result};
use crc32fast::Hasher;

pub struct Checksum;

impl Checksum {
    pub fn compute(data: &[u8]) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    pub fn verify(data: &[u8], expected: u32) -> Result<()> {
        let actual = Self::compute(data);
        if actual != expected {
            return Err(DbError::WALCorrupt(format!(
                "checksum mismatch: expected {:08x}, got {:08x}",
                expected, actual
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let data = b"geeqodb";
        let sum = Checksum::compute(data);
        assert!(Checksum::verify(data, sum).is_ok());
        assert!(Checksum::verify(data, sum.wrapping_add(1)).is_err());
    }
}
