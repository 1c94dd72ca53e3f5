//! Digests used to key tables and seal stored rows.

use goldval_core::StoreKey;

pub(crate) fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// SHA-256 over the key fields, NUL separated.
#[must_use]
pub fn key_digest(key: &StoreKey) -> String {
    use sha2::Digest as _;
    let mut hasher = sha2::Sha256::new();
    hasher.update(key.test_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(key.config_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(key.algorithm_mask.to_le_bytes());
    hasher.update(key.record_len.to_le_bytes());
    hex_lower(&hasher.finalize())
}

/// BLAKE3 over the little-endian bytes of a record.
#[must_use]
pub fn row_digest(record: &[u32]) -> String {
    let mut hasher = blake3::Hasher::new();
    for value in record {
        hasher.update(&value.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(record_len: u32) -> StoreKey {
        StoreKey {
            test_name: "scene".to_string(),
            config_name: "default".to_string(),
            algorithm_mask: 3,
            record_len,
        }
    }

    #[test]
    fn key_digest_is_stable_and_field_sensitive() {
        let a = key_digest(&key(8));
        assert_eq!(a.len(), 64);
        assert_eq!(a, key_digest(&key(8)));
        assert_ne!(a, key_digest(&key(9)));
    }

    #[test]
    fn row_digest_depends_on_order() {
        assert_ne!(row_digest(&[1, 2]), row_digest(&[2, 1]));
        assert_eq!(row_digest(&[]), blake3::hash(&[]).to_hex().to_string());
    }

    #[test]
    fn hex_is_lowercase() {
        assert_eq!(hex_lower(&[0xAB, 0x01]), "ab01");
    }
}
