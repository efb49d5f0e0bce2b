//! SHA-256 fingerprints for source files and shared definitions.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of the concatenation of `parts`, each followed by a NUL so
/// that `("ab", "c")` and `("a", "bc")` hash differently.
pub fn sha256_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Hash of a single shared definition: its kind, its name and its exact
/// declaration text.
pub fn definition_hash(kind: &str, name: &str, text: &str) -> String {
    sha256_hex(&[kind.as_bytes(), name.as_bytes(), text.as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separates_parts() {
        assert_ne!(sha256_hex(&[b"ab", b"c"]), sha256_hex(&[b"a", b"bc"]));
        assert_eq!(sha256_hex(&[b"x"]).len(), 64);
    }

    #[test]
    fn definition_hash_depends_on_text() {
        let a = definition_hash("struct", "Point", "interface Point { x: number }");
        let b = definition_hash("struct", "Point", "interface Point { x: number; y: number }");
        assert_ne!(a, b);
    }
}
