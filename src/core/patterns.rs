//! Credential normalization rules
//!
//! Free-text credentials arrive as "M.D.", "m d", "MD, DO", "M. D., PH.D." and
//! so on. They are normalized by an ordered list of rules applied left to
//! right. Each rule can be applied on its own, which is how the tests cover them.

use lazy_static::lazy_static;
use regex::Regex;

/// One normalization step
#[derive(Debug)]
pub enum CredentialRule {
    /// Regex substitution over the whole string
    Substitute {
        name: &'static str,
        pattern: Regex,
        replacement: &'static str,
    },
    /// ASCII-insensitive uppercase
    Uppercase,
    /// Remove leading and trailing whitespace
    Trim,
}

impl CredentialRule {
    pub fn name(&self) -> &'static str {
        match self {
            CredentialRule::Substitute { name, .. } => *name,
            CredentialRule::Uppercase => "uppercase",
            CredentialRule::Trim => "trim",
        }
    }

    /// Apply this rule to `input`
    pub fn apply(&self, input: &str) -> String {
        match self {
            CredentialRule::Substitute {
                pattern,
                replacement,
                ..
            } => pattern.replace_all(input, *replacement).into_owned(),
            CredentialRule::Uppercase => input.to_uppercase(),
            CredentialRule::Trim => input.trim().to_string(),
        }
    }
}

/// Helper function to compile a built-in pattern
fn substitute(name: &'static str, pattern: &str, replacement: &'static str) -> CredentialRule {
    CredentialRule::Substitute {
        name,
        pattern: compile_pattern(pattern),
        replacement,
    }
}

/// Compile a pattern that is known to be valid
fn compile_pattern(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => panic!("invalid built-in credential pattern {pattern:?}: {e}"),
    }
}

/// The ordered rule list
fn credential_rules() -> Vec<CredentialRule> {
    vec![
        // "M D", "M.D", "M, D" in any case
        substitute("collapse-md", r"(?i)\bM[\s.,]*D\b", "MD"),
        substitute("collapse-do", r"(?i)\bD[\s.,]*O\b", "DO"),
        CredentialRule::Uppercase,
        substitute("strip-periods", r"\.", ""),
        substitute("collapse-whitespace", r"\s+", " "),
        CredentialRule::Trim,
    ]
}

lazy_static! {
    /// Compiled rules in application order
    pub static ref CREDENTIAL_RULES: Vec<CredentialRule> = credential_rules();
}

/// Normalize a free-text credential
///
/// The result is stable under a second application.
pub fn normalize_credential(raw: &str) -> String {
    CREDENTIAL_RULES
        .iter()
        .fold(raw.to_string(), |acc, rule| rule.apply(&acc))
}

/// Whole-word token test over normalized credentials
#[derive(Debug, Clone)]
pub struct CredentialMatcher {
    tokens: Vec<String>,
    pattern: Regex,
}

impl CredentialMatcher {
    /// Build a matcher accepting any of `tokens` as a whole word
    ///
    /// Tokens are normalized the same way credentials are, so `"M.D."` and
    /// `"MD"` build the same matcher.
    pub fn new<S: AsRef<str>>(tokens: &[S]) -> Result<Self, regex::Error> {
        let tokens: Vec<String> = tokens
            .iter()
            .map(|t| normalize_credential(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();
        let alternation = tokens
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(r"\b(?:{alternation})\b"))?;
        Ok(Self { tokens, pattern })
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Test an already-normalized credential
    pub fn is_match_normalized(&self, normalized: &str) -> bool {
        !self.tokens.is_empty() && self.pattern.is_match(normalized)
    }

    /// Normalize `raw` and test it
    pub fn is_match(&self, raw: &str) -> bool {
        self.is_match_normalized(&normalize_credential(raw))
    }
}

impl Default for CredentialMatcher {
    fn default() -> Self {
        Self {
            tokens: vec!["MD".to_string()],
            pattern: compile_pattern(r"\b(?:MD)\b"),
        }
    }
}
