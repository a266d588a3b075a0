//! Model-free fallback completions.
//!
//! When the rate limiter is over budget the gate still owes the editor
//! an answer. These are the two things worth saying without a model:
//! close the innermost open bracket, or nothing.

use crate::language::LanguageProfile;
use crate::request::AssistRequest;

/// Cheap local completion for a rate-limited request.
pub fn complete(request: &AssistRequest, profile: Option<&LanguageProfile>) -> Option<String> {
    let line = request.current_line();
    if let Some(profile) = profile {
        if profile.in_string(line) {
            return None;
        }
    }
    let closer = unclosed_delimiter(&request.prefix)?;
    // Don't close what the suffix already closes.
    if request.suffix.trim_start().starts_with(closer) {
        return None;
    }
    Some(closer.to_string())
}

/// The closing delimiter for the innermost unclosed bracket, if any.
fn unclosed_delimiter(prefix: &str) -> Option<char> {
    let mut stack = Vec::new();
    for ch in prefix.chars() {
        match ch {
            '(' | '[' | '{' => stack.push(ch),
            ')' | ']' | '}' => {
                stack.pop();
            }
            _ => {}
        }
    }
    stack.pop().map(|open| match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    })
}
