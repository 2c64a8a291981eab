//! Structural validation of generated child prompts.
//!
//! The text generator is an untrusted producer. A child is only minted
//! from text that passes [`ChildValidator::validate`].

use regex::Regex;
use std::fmt;

/// Why generated text was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Nothing left after normalization
    #[error("empty response")]
    Empty,

    /// Byte-identical to a parent
    #[error("identical to a parent")]
    IdenticalToParent,

    /// A structural check failed
    #[error("{0}")]
    Structure(String),
}

/// A configurable predicate on candidate text.
pub trait StructuralCheck: Send + Sync + fmt::Debug {
    /// Requirement in words, included in generation requests.
    fn describe(&self) -> String;

    /// Check `text`, returning the failure message.
    fn check(&self, text: &str) -> std::result::Result<(), String>;
}

/// Text must begin with a prefix, ignoring ASCII case.
#[derive(Debug, Clone)]
pub struct StartsWith(pub String);

impl StructuralCheck for StartsWith {
    fn describe(&self) -> String {
        format!("MUST start with \"{}...\"", self.0)
    }

    fn check(&self, text: &str) -> std::result::Result<(), String> {
        let prefix = self.0.as_str();
        let matches = text
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if matches {
            Ok(())
        } else {
            Err(format!("does not start with \"{}\"", prefix))
        }
    }
}

/// Text must match a regular expression somewhere.
#[derive(Debug, Clone)]
pub struct Pattern(pub Regex);

impl StructuralCheck for Pattern {
    fn describe(&self) -> String {
        format!("must match the pattern /{}/", self.0.as_str())
    }

    fn check(&self, text: &str) -> std::result::Result<(), String> {
        if self.0.is_match(text) {
            Ok(())
        } else {
            Err(format!("does not match /{}/", self.0.as_str()))
        }
    }
}

/// Text must have at least this many characters.
#[derive(Debug, Clone, Copy)]
pub struct MinChars(pub usize);

impl StructuralCheck for MinChars {
    fn describe(&self) -> String {
        format!("at least {} characters", self.0)
    }

    fn check(&self, text: &str) -> std::result::Result<(), String> {
        let len = text.chars().count();
        if len >= self.0 {
            Ok(())
        } else {
            Err(format!("too short ({} < {} characters)", len, self.0))
        }
    }
}

/// Text must have at most this many characters.
#[derive(Debug, Clone, Copy)]
pub struct MaxChars(pub usize);

impl StructuralCheck for MaxChars {
    fn describe(&self) -> String {
        format!("at most {} characters", self.0)
    }

    fn check(&self, text: &str) -> std::result::Result<(), String> {
        let len = text.chars().count();
        if len <= self.0 {
            Ok(())
        } else {
            Err(format!("too long ({} > {} characters)", len, self.0))
        }
    }
}

/// Single authority on accepting generated child text.
#[derive(Debug, Default)]
pub struct ChildValidator {
    checks: Vec<Box<dyn StructuralCheck>>,
}

impl ChildValidator {
    /// Validator with no structural checks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validator requiring a system-prompt style "You are ..." opening.
    pub fn system_prompt() -> Self {
        Self::new()
            .with_check(StartsWith("You are".to_string()))
            .with_check(MinChars(20))
    }

    /// Add a structural check.
    pub fn with_check(mut self, check: impl StructuralCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    /// Requirements of all checks, for generation requests.
    pub fn requirements(&self) -> Vec<String> {
        self.checks.iter().map(|c| c.describe()).collect()
    }

    /// Validate normalized `text` against its `parents`.
    pub fn validate(&self, text: &str, parents: &[&str]) -> std::result::Result<(), ValidationError> {
        if text.trim().is_empty() {
            return Err(ValidationError::Empty);
        }
        if parents.iter().any(|p| *p == text) {
            return Err(ValidationError::IdenticalToParent);
        }
        for check in &self.checks {
            check.check(text).map_err(ValidationError::Structure)?;
        }
        Ok(())
    }
}

/// Strip what generators commonly wrap around an answer.
///
/// Trims whitespace, removes a surrounding code fence (with optional
/// language tag) and one pair of matching surrounding quotes.
pub fn normalize(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(fenced) = text.strip_prefix("```") {
        if let Some(body) = fenced.strip_suffix("```") {
            // drop the info string on the opening line
            text = match body.split_once('\n') {
                Some((_, rest)) => rest,
                None => body,
            }
            .trim();
        }
    }

    for (open, close) in [('"', '"'), ('\'', '\''), ('\u{201c}', '\u{201d}')] {
        if let Some(inner) = text.strip_prefix(open).and_then(|t| t.strip_suffix(close)) {
            // `"a" and "b"` is two quoted phrases, not one wrapped answer
            if !has_unescaped(inner, open) && !has_unescaped(inner, close) {
                text = inner.trim();
            }
            break;
        }
    }

    text.to_string()
}

/// Whether `quote` occurs in `text` without a preceding backslash.
fn has_unescaped(text: &str, quote: char) -> bool {
    let mut escaped = false;
    for c in text.chars() {
        if c == quote && !escaped {
            return true;
        }
        escaped = c == '\\' && !escaped;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  \"You are calm.\"  "), "You are calm.");
        assert_eq!(normalize("```text\nYou are calm.\n```"), "You are calm.");
        assert_eq!(normalize("\u{201c}You are calm.\u{201d}"), "You are calm.");
        assert_eq!(normalize("You are \"calm\"."), "You are \"calm\".");
    }

    #[test]
    fn test_normalize_keeps_inner_quotes() {
        let reply = "\"Calm\" is key, so you are \"kind\"";
        assert_eq!(normalize(reply), reply);
        assert_eq!(
            normalize("\"You are a \\\"calm\\\" coach.\""),
            "You are a \\\"calm\\\" coach."
        );
    }

    #[test]
    fn test_rejects_empty_and_identical() {
        let validator = ChildValidator::new();
        assert_eq!(validator.validate("   ", &[]), Err(ValidationError::Empty));
        assert_eq!(
            validator.validate("You are kind.", &["You are kind.", "other"]),
            Err(ValidationError::IdenticalToParent)
        );
        assert!(validator.validate("You are kinder.", &["You are kind."]).is_ok());
    }

    #[test]
    fn test_system_prompt_checks() {
        let validator = ChildValidator::system_prompt();

        assert!(validator.validate("you are a gentle, patient coach.", &[]).is_ok());
        assert!(matches!(
            validator.validate("Coach gently and patiently, always.", &[]),
            Err(ValidationError::Structure(_))
        ));
        assert!(matches!(
            validator.validate("You are.", &[]),
            Err(ValidationError::Structure(_))
        ));
        assert_eq!(validator.requirements().len(), 2);
    }

    #[test]
    fn test_pattern_and_max_chars() {
        let validator = ChildValidator::new()
            .with_check(Pattern(Regex::new(r"(?i)\bcoach\b").unwrap()))
            .with_check(MaxChars(40));

        assert!(validator.validate("You are a coach.", &[]).is_ok());
        assert!(validator.validate("You are a mentor.", &[]).is_err());
        assert!(validator
            .validate("You are a coach who talks for a very long time.", &[])
            .is_err());
    }
}
