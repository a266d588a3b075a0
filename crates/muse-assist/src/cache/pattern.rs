//! Pattern tier: generalized keys, similarity matching, exemplar
//! adaptation.
//!
//! Keys are lexed into identifier, number, and string placeholders so
//! that structurally similar code shares one exemplar. On a hit, the
//! exemplar's identifiers are substituted positionally with the current
//! key's, adapting the stored response to new names.

use std::collections::HashMap;

use strsim::normalized_levenshtein;

use crate::fingerprint::ContextFingerprint;

/// Confidence a pattern starts with.
const INITIAL_CONFIDENCE: f64 = 0.5;
/// Confidence gained per reuse.
const CONFIDENCE_STEP: f64 = 0.1;
/// Confidence required before a pattern is served outside the context
/// it was learned in. Three reuses get an entry there; the bar sits
/// strictly between the second and third accumulated step.
const CROSS_CONTEXT_CONFIDENCE: f64 = 0.75;

/// A key reduced to its structure.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralizedKey {
    pub pattern: String,
    pub identifiers: Vec<String>,
}

/// Lex a key into a generalized pattern.
///
/// Words become `$id` (collected in order), numeric literals `$num`,
/// quoted literals `$str`; whitespace runs collapse to one space and
/// punctuation passes through.
pub fn generalize(text: &str) -> GeneralizedKey {
    let mut pattern = String::new();
    let mut identifiers = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&ch) = chars.peek() {
        if ch.is_alphabetic() || ch == '_' {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    word.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            pattern.push_str("$id");
            identifiers.push(word);
        } else if ch.is_ascii_digit() {
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() || c == '.' || c == '_' {
                    chars.next();
                } else {
                    break;
                }
            }
            pattern.push_str("$num");
        } else if ch == '"' || ch == '\'' || ch == '`' {
            chars.next();
            let mut escaped = false;
            for c in chars.by_ref() {
                if escaped {
                    escaped = false;
                    continue;
                }
                if c == '\\' {
                    escaped = true;
                    continue;
                }
                if c == ch {
                    break;
                }
            }
            pattern.push_str("$str");
        } else if ch.is_whitespace() {
            while chars.peek().map(|c| c.is_whitespace()).unwrap_or(false) {
                chars.next();
            }
            pattern.push(' ');
        } else {
            pattern.push(ch);
            chars.next();
        }
    }
    GeneralizedKey {
        pattern,
        identifiers,
    }
}

/// An exemplar response stored under its generalized pattern.
#[derive(Debug, Clone)]
pub struct PatternEntry {
    pub pattern: String,
    pub exemplar_identifiers: Vec<String>,
    pub response: String,
    pub fingerprint: ContextFingerprint,
    pub confidence: f64,
    pub usage_count: u32,
}

/// Bounded store of patterns, matched by normalized edit distance.
#[derive(Debug)]
pub struct PatternStore {
    entries: HashMap<String, PatternEntry>,
    capacity: usize,
    similarity_floor: f64,
    purge_fraction: f64,
}

impl PatternStore {
    pub fn new(capacity: usize, similarity_floor: f64, purge_fraction: f64) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            similarity_floor,
            purge_fraction,
        }
    }

    /// Find the closest eligible pattern for this key and adapt its
    /// exemplar. Patterns from a different context are eligible only
    /// once their confidence clears the cross-context bar; nothing under
    /// the similarity floor is served.
    pub fn lookup(&mut self, key: &str, fingerprint: &ContextFingerprint) -> Option<String> {
        let current = generalize(key);
        let best = self
            .entries
            .values()
            .filter(|e| {
                e.fingerprint == *fingerprint || e.confidence >= CROSS_CONTEXT_CONFIDENCE
            })
            .map(|e| {
                let similarity = if e.pattern == current.pattern {
                    1.0
                } else {
                    normalized_levenshtein(&e.pattern, &current.pattern)
                };
                (e.pattern.clone(), similarity)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let (pattern, similarity) = best?;
        if similarity < self.similarity_floor {
            return None;
        }
        let entry = self.entries.get_mut(&pattern)?;
        entry.usage_count += 1;
        entry.confidence = (entry.confidence + CONFIDENCE_STEP).min(1.0);
        Some(adapt(
            &entry.response,
            &entry.exemplar_identifiers,
            &current.identifiers,
        ))
    }

    /// Record a response under the key's generalized pattern. A repeat of
    /// an existing pattern replaces the exemplar and raises confidence.
    pub fn record(&mut self, key: &str, response: &str, fingerprint: ContextFingerprint) {
        let general = generalize(key);
        match self.entries.get_mut(&general.pattern) {
            Some(entry) => {
                entry.confidence = (entry.confidence + CONFIDENCE_STEP).min(1.0);
                entry.exemplar_identifiers = general.identifiers;
                entry.response = response.to_string();
                entry.fingerprint = fingerprint;
            }
            None => {
                self.entries.insert(
                    general.pattern.clone(),
                    PatternEntry {
                        pattern: general.pattern,
                        exemplar_identifiers: general.identifiers,
                        response: response.to_string(),
                        fingerprint,
                        confidence: INITIAL_CONFIDENCE,
                        usage_count: 0,
                    },
                );
                if self.entries.len() > self.capacity {
                    self.evict();
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    fn confidence_of(&self, key: &str) -> Option<f64> {
        self.entries
            .get(&generalize(key).pattern)
            .map(|e| e.confidence)
    }

    fn evict(&mut self) -> usize {
        // Usefulness is usage weighted by confidence; ties fall to the
        // less confident entry.
        let mut scored: Vec<(String, f64, f64)> = self
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.usage_count as f64 * e.confidence, e.confidence))
            .collect();
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal))
        });
        let purge = ((self.entries.len() as f64) * self.purge_fraction).ceil() as usize;
        let purge = purge.max(1);
        for (pattern, _, _) in scored.into_iter().take(purge) {
            self.entries.remove(&pattern);
        }
        purge
    }
}

/// Substitute the current key's identifiers for the exemplar's, by
/// position, throughout the response. Substitution goes through unique
/// placeholders so earlier replacements cannot feed later ones.
fn adapt(response: &str, exemplar: &[String], current: &[String]) -> String {
    let pairs = exemplar.len().min(current.len());
    let mut adapted = response.to_string();
    for (i, old) in exemplar.iter().take(pairs).enumerate() {
        if old == &current[i] {
            continue;
        }
        adapted = replace_word(&adapted, old, &placeholder(i));
    }
    for (i, new) in current.iter().take(pairs).enumerate() {
        if exemplar[i] == *new {
            continue;
        }
        adapted = adapted.replace(&placeholder(i), new);
    }
    adapted
}

fn placeholder(i: usize) -> String {
    format!("\u{1}{i}\u{1}")
}

/// Whole-word replacement. Occurrences embedded in larger identifiers
/// stay untouched.
fn replace_word(text: &str, from: &str, to: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find(from) {
        let before_ok = rest[..idx]
            .chars()
            .next_back()
            .map(|c| !is_word_char(c))
            .unwrap_or(true);
        let after_ok = rest[idx + from.len()..]
            .chars()
            .next()
            .map(|c| !is_word_char(c))
            .unwrap_or(true);
        out.push_str(&rest[..idx]);
        if before_ok && after_ok {
            out.push_str(to);
        } else {
            out.push_str(from);
        }
        rest = &rest[idx + from.len()..];
    }
    out.push_str(rest);
    out
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::CodeContext;

    fn fingerprint(symbol: &str) -> ContextFingerprint {
        ContextFingerprint::of(&CodeContext {
            language: "rust".to_string(),
            enclosing_symbol: Some(symbol.to_string()),
            imports: vec![],
        })
    }

    #[test]
    fn test_generalize_structure() {
        let general = generalize("let total = price * 2;");
        assert_eq!(general.pattern, "$id $id = $id * $num;");
        assert_eq!(general.identifiers, vec!["let", "total", "price"]);
    }

    #[test]
    fn test_generalize_strings_and_numbers() {
        let general = generalize("log(\"count: {}\", 3.5)");
        assert_eq!(general.pattern, "$id($str, $num)");
        assert_eq!(general.identifiers, vec!["log"]);
    }

    #[test]
    fn test_lookup_adapts_identifiers() {
        let mut store = PatternStore::new(10, 0.8, 0.2);
        store.record(
            "let total = price * 2;",
            "total = price * price",
            fingerprint("main"),
        );
        let hit = store.lookup("let sum = cost * 3;", &fingerprint("main"));
        assert_eq!(hit.as_deref(), Some("sum = cost * cost"));
    }

    #[test]
    fn test_foreign_context_needs_confidence() {
        let mut store = PatternStore::new(10, 0.8, 0.2);
        store.record("let a = 1;", "done", fingerprint("main"));
        assert!(store.lookup("let b = 2;", &fingerprint("other")).is_none());

        // Three same-context reuses raise confidence to the bar.
        for _ in 0..3 {
            assert!(store.lookup("let c = 3;", &fingerprint("main")).is_some());
        }
        assert!(store.lookup("let b = 2;", &fingerprint("other")).is_some());
    }

    #[test]
    fn test_adaptation_handles_swapped_names() {
        // a->b while b->a must not cascade.
        let adapted = adapt(
            "a + b",
            &["a".to_string(), "b".to_string()],
            &["b".to_string(), "a".to_string()],
        );
        assert_eq!(adapted, "b + a");
    }

    #[test]
    fn test_replace_word_respects_boundaries() {
        assert_eq!(replace_word("value + values", "value", "x"), "x + values");
    }

    #[test]
    fn test_dissimilar_key_misses() {
        let mut store = PatternStore::new(10, 0.8, 0.2);
        store.record("let a = 1;", "done", fingerprint("main"));
        assert!(store
            .lookup("while (running) { tick(); }", &fingerprint("main"))
            .is_none());
    }

    #[test]
    fn test_confidence_grows_and_caps() {
        let mut store = PatternStore::new(10, 0.8, 0.2);
        store.record("let a = 1;", "r", fingerprint("main"));
        assert_eq!(store.confidence_of("let a = 1;"), Some(0.5));
        store.record("let b = 2;", "r", fingerprint("main"));
        let grown = store.confidence_of("let a = 1;").unwrap_or(0.0);
        assert!((grown - 0.6).abs() < 1e-9);
        for _ in 0..20 {
            store.record("let c = 3;", "r", fingerprint("main"));
        }
        assert_eq!(store.confidence_of("let a = 1;"), Some(1.0));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let mut store = PatternStore::new(2, 0.8, 0.2);
        store.record("let a = 1;", "r1", fingerprint("main"));
        store.record("fn f() {}", "r2", fingerprint("main"));
        store.record("return [x];", "r3", fingerprint("main"));
        assert!(store.len() <= 2);
    }
}
