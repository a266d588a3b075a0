//! Context fingerprinting for cache validity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::request::CodeContext;

/// Stable fingerprint of the code context a response was produced in.
///
/// Two requests share a fingerprint when language, enclosing symbol, and
/// import set all match. Import order does not matter. Identical key text
/// in a different context is not served from cache until the entry has
/// earned fuzzy trust through repeated hits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextFingerprint(String);

impl ContextFingerprint {
    pub fn of(context: &CodeContext) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(context.language.as_bytes());
        hasher.update([0]);
        if let Some(symbol) = &context.enclosing_symbol {
            hasher.update(symbol.as_bytes());
        }
        hasher.update([0]);
        let mut imports: Vec<&str> = context.imports.iter().map(String::as_str).collect();
        imports.sort_unstable();
        for import in imports {
            hasher.update(import.as_bytes());
            hasher.update([0]);
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
