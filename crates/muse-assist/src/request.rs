//! Request and context types shared by the gate, cache and engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What kind of assistance a request is for. Drives cache TTL and
/// persistence decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Completion,
    Fix,
    Chat,
    Explanation,
}

impl Feature {
    /// How long a cached response stays valid.
    ///
    /// Completions go stale with the surrounding code within seconds;
    /// conversational answers survive much longer.
    pub fn ttl(self) -> Duration {
        match self {
            Feature::Completion => Duration::from_secs(60),
            Feature::Fix => Duration::from_secs(5 * 60),
            Feature::Chat => Duration::from_secs(30 * 60),
            Feature::Explanation => Duration::from_secs(60 * 60),
        }
    }

    /// Features whose responses are worth persisting on first sight.
    pub fn persist_eagerly(self) -> bool {
        matches!(self, Feature::Completion | Feature::Fix)
    }
}

/// Zero-based cursor position in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// Code context around a request; raw material of the cache fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeContext {
    /// Language id, e.g. "rust".
    pub language: String,
    /// Innermost enclosing function or type name, if known.
    pub enclosing_symbol: Option<String>,
    /// Import lines visible in the file.
    pub imports: Vec<String>,
}

/// An interactive completion request from the editor.
#[derive(Debug, Clone)]
pub struct AssistRequest {
    /// Document identity (path or URI).
    pub document: String,
    pub position: Position,
    /// Text before the cursor.
    pub prefix: String,
    /// Text after the cursor.
    pub suffix: String,
    pub context: CodeContext,
}

impl AssistRequest {
    /// Identity used for duplicate suppression.
    pub fn key(&self) -> RequestKey {
        RequestKey {
            document: self.document.clone(),
            line: self.position.line,
            column: self.position.column,
            prefix: self.prefix.clone(),
        }
    }

    /// Debounce slot: one pending completion per document.
    pub fn slot(&self) -> &str {
        &self.document
    }

    /// The line the cursor is on, up to the cursor.
    pub fn current_line(&self) -> &str {
        self.prefix.rsplit('\n').next().unwrap_or("")
    }
}

/// Identity of an interactive request: document, position, and the exact
/// prefix text. At most one inference call is in flight per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub document: String,
    pub line: u32,
    pub column: u32,
    pub prefix: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_ttl_is_shortest() {
        assert!(Feature::Completion.ttl() < Feature::Fix.ttl());
        assert!(Feature::Fix.ttl() < Feature::Chat.ttl());
        assert!(Feature::Chat.ttl() <= Feature::Explanation.ttl());
    }

    #[test]
    fn test_persistence_classes() {
        assert!(Feature::Completion.persist_eagerly());
        assert!(Feature::Fix.persist_eagerly());
        assert!(!Feature::Chat.persist_eagerly());
        assert!(!Feature::Explanation.persist_eagerly());
    }

    #[test]
    fn test_current_line() {
        let request = AssistRequest {
            document: "src/main.rs".to_string(),
            position: Position { line: 2, column: 8 },
            prefix: "fn main() {\n    let x = 1;\n    let y = ".to_string(),
            suffix: String::new(),
            context: CodeContext::default(),
        };
        assert_eq!(request.current_line(), "    let y = ");
    }

    #[test]
    fn test_key_identity() {
        let a = RequestKey {
            document: "a.rs".into(),
            line: 1,
            column: 2,
            prefix: "let ".into(),
        };
        let mut b = a.clone();
        assert_eq!(a, b);
        b.column = 3;
        assert_ne!(a, b);
    }
}
