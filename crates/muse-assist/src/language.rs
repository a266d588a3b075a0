//! Static language registry used by the gate's syntax-aware filters and
//! the heuristic fallback.

/// Surface syntax of one language, just enough for cheap line-local
/// classification. No parsing happens here.
#[derive(Debug, Clone, Copy)]
pub struct LanguageProfile {
    pub id: &'static str,
    pub extensions: &'static [&'static str],
    pub line_comment: &'static str,
    pub block_comment: Option<(&'static str, &'static str)>,
    pub string_delims: &'static [char],
}

const PROFILES: &[LanguageProfile] = &[
    LanguageProfile {
        id: "rust",
        extensions: &["rs"],
        line_comment: "//",
        block_comment: Some(("/*", "*/")),
        string_delims: &['"'],
    },
    LanguageProfile {
        id: "python",
        extensions: &["py"],
        line_comment: "#",
        block_comment: None,
        string_delims: &['"', '\''],
    },
    LanguageProfile {
        id: "javascript",
        extensions: &["js", "jsx", "mjs"],
        line_comment: "//",
        block_comment: Some(("/*", "*/")),
        string_delims: &['"', '\'', '`'],
    },
    LanguageProfile {
        id: "typescript",
        extensions: &["ts", "tsx"],
        line_comment: "//",
        block_comment: Some(("/*", "*/")),
        string_delims: &['"', '\'', '`'],
    },
    LanguageProfile {
        id: "go",
        extensions: &["go"],
        line_comment: "//",
        block_comment: Some(("/*", "*/")),
        string_delims: &['"', '`'],
    },
    LanguageProfile {
        id: "c",
        extensions: &["c", "h"],
        line_comment: "//",
        block_comment: Some(("/*", "*/")),
        string_delims: &['"'],
    },
    LanguageProfile {
        id: "cpp",
        extensions: &["cc", "cpp", "cxx", "hpp"],
        line_comment: "//",
        block_comment: Some(("/*", "*/")),
        string_delims: &['"'],
    },
];

/// Look a profile up by language id.
pub fn by_id(id: &str) -> Option<&'static LanguageProfile> {
    PROFILES.iter().find(|p| p.id.eq_ignore_ascii_case(id))
}

/// Detect the language of a document from its file extension.
pub fn detect(document: &str) -> Option<&'static LanguageProfile> {
    let ext = std::path::Path::new(document).extension()?.to_str()?;
    PROFILES
        .iter()
        .find(|p| p.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

impl LanguageProfile {
    /// Whether the end of `line` sits inside a string literal.
    pub fn in_string(&self, line: &str) -> bool {
        let mut open: Option<char> = None;
        let mut escaped = false;
        for ch in line.chars() {
            if escaped {
                escaped = false;
                continue;
            }
            if ch == '\\' {
                escaped = true;
                continue;
            }
            match open {
                Some(delim) if ch == delim => open = None,
                None if self.string_delims.contains(&ch) => open = Some(ch),
                _ => {}
            }
        }
        open.is_some()
    }

    /// Whether the end of `line` sits inside a comment.
    ///
    /// Works from a single line of prefix, so a block comment opened on
    /// an earlier line is not visible. The filters treat that as an
    /// acceptable false negative.
    pub fn in_comment(&self, line: &str) -> bool {
        if let Some(idx) = line.find(self.line_comment) {
            if !self.in_string(&line[..idx]) {
                return true;
            }
        }
        if let Some((open, close)) = self.block_comment {
            if let Some(idx) = line.rfind(open) {
                if !line[idx + open.len()..].contains(close) && !self.in_string(&line[..idx]) {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(detect("src/main.rs").map(|p| p.id), Some("rust"));
        assert_eq!(detect("scripts/build.py").map(|p| p.id), Some("python"));
        assert_eq!(detect("app/index.tsx").map(|p| p.id), Some("typescript"));
        assert!(detect("notes.txt").is_none());
        assert!(detect("Makefile").is_none());
    }

    #[test]
    fn test_in_string() {
        let rust = by_id("rust").unwrap();
        assert!(rust.in_string("let s = \"hello"));
        assert!(!rust.in_string("let s = \"hello\";"));
        assert!(!rust.in_string("let s = \"he\\\"llo\";"));
        let python = by_id("python").unwrap();
        assert!(python.in_string("s = 'par"));
    }

    #[test]
    fn test_in_comment() {
        let rust = by_id("rust").unwrap();
        assert!(rust.in_comment("    // fill in "));
        assert!(rust.in_comment("let x = 1; /* later "));
        assert!(!rust.in_comment("let x = 1; /* done */ let y ="));
        assert!(!rust.in_comment("let url = \"https://example.com"));
    }

    #[test]
    fn test_comment_marker_inside_string() {
        let python = by_id("python").unwrap();
        assert!(!python.in_comment("tag = \"#main\" + suffix"));
        assert!(python.in_comment("x = 1  # count"));
    }
}
