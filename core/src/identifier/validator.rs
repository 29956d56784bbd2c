//! Checks and dry runs for user-supplied identifier patterns.

use super::normalize;
use crate::{CoreError, CoreResult};
use regex::Regex;
use serde::Serialize;

/// A well-known identifier shape users can copy into their settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuiltinPattern {
    pub name: &'static str,
    pub pattern: &'static str,
    pub description: &'static str,
    pub example: &'static str,
}

/// Outcome of running one pattern against one filename
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatternTestResult {
    pub filename: String,
    pub matched: Option<String>,
    /// Capture groups of the last match; non-participating groups are empty
    pub groups: Vec<String>,
    pub extracted: Option<String>,
    pub error: Option<String>,
}

impl PatternTestResult {
    pub fn is_success(&self) -> bool {
        self.matched.is_some()
    }
}

const BUILTIN_PATTERNS: &[BuiltinPattern] = &[
    BuiltinPattern {
        name: "standard",
        pattern: r"(?i)([a-z]+)[-_](\d+)",
        description: "Letters, dash or underscore, digits",
        example: "ABC-123, ipx-456, SSIS_789",
    },
    BuiltinPattern {
        name: "compound",
        pattern: r"(?i)([a-z]+[-_][a-z]+)[-_](\d+)",
        description: "Two letter groups before the number",
        example: "MKY-NS-001",
    },
    BuiltinPattern {
        name: "fc2",
        pattern: r"(?i)FC2[-_]?(?:PPV[-_]?)?(\d+)",
        description: "FC2 and FC2-PPV releases, digits only",
        example: "FC2-1234567, FC2PPV-1234567, fc2_ppv_1234567",
    },
    BuiltinPattern {
        name: "catalog-number",
        pattern: r"^(\d{6,})$",
        description: "Pure catalog numbers of at least six digits",
        example: "123456, 1234567890",
    },
    BuiltinPattern {
        name: "dated-release",
        pattern: r"(?i)(\d{6})[-_](\d{3})",
        description: "Six-digit date and three-digit sequence",
        example: "123456-789, 010122_001",
    },
    BuiltinPattern {
        name: "tokyo-hot",
        pattern: r"(?i)(cz|gedo|k|n|red-|se)(\d{2,4})",
        description: "Tokyo-Hot series prefixes",
        example: "n1234, k0123, red-123",
    },
    BuiltinPattern {
        name: "heyzo",
        pattern: r"(?i)heyzo[-_]?(\d{4})",
        description: "HEYZO with four digits",
        example: "HEYZO-1234, heyzo1234",
    },
    BuiltinPattern {
        name: "x-art",
        pattern: r"(?i)x-art\.(\d{2})\.(\d{2})\.(\d{2})",
        description: "X-Art dated releases",
        example: "x-art.20.01.15",
    },
    BuiltinPattern {
        name: "heydouga",
        pattern: r"(?i)heydouga[-_]?(\d{4})[-_](\d{3,5})",
        description: "Heydouga with member and sequence numbers",
        example: "heydouga-4030-1234",
    },
    BuiltinPattern {
        name: "strict-uppercase",
        pattern: r"([A-Z]{2,}-\d{3,})",
        description: "Already normalized uppercase identifiers",
        example: "ABC-123, ABCD-1234",
    },
    BuiltinPattern {
        name: "site-prefixed",
        pattern: r"(?i)(?:\w+\.(?:com|net|cc|org|xyz)@)?([a-z]{3,}[-_]\d{3,})",
        description: "Identifiers behind a site domain prefix",
        example: "4k2.com@ipzz-655",
    },
];

/// Catalogue of well-known patterns
pub fn builtin_patterns() -> &'static [BuiltinPattern] {
    BUILTIN_PATTERNS
}

pub fn find_builtin(name: &str) -> Option<&'static BuiltinPattern> {
    BUILTIN_PATTERNS.iter().find(|p| p.name == name)
}

fn compile(pattern: &str) -> CoreResult<Regex> {
    if pattern.trim().is_empty() {
        return Err(CoreError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "pattern is empty".to_string(),
        });
    }
    Regex::new(pattern).map_err(|e| CoreError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

pub fn validate_pattern(pattern: &str) -> CoreResult<()> {
    compile(pattern).map(|_| ())
}

/// Validate every whitespace-separated pattern, failing on the first bad one
pub fn validate_patterns(patterns: &str) -> CoreResult<()> {
    patterns.split_whitespace().try_for_each(validate_pattern)
}

/// Run `pattern` against `filename` the way the parser would: last match,
/// first capture group when present, then normalization
pub fn test_pattern(pattern: &str, filename: &str) -> PatternTestResult {
    let mut result = PatternTestResult {
        filename: filename.to_string(),
        ..PatternTestResult::default()
    };

    let regex = match compile(pattern) {
        Ok(regex) => regex,
        Err(e) => {
            result.error = Some(e.to_string());
            return result;
        }
    };

    let Some(last) = regex.captures_iter(filename).last() else {
        result.error = Some("no match".to_string());
        return result;
    };

    let whole = last.get(0).map_or("", |m| m.as_str());
    result.matched = Some(whole.to_string());
    result.groups = last
        .iter()
        .skip(1)
        .map(|group| group.map_or(String::new(), |m| m.as_str().to_string()))
        .collect();

    let raw = result.groups.first().map_or(whole, String::as_str);
    result.extracted = Some(normalize(raw));
    result
}

/// Built-in patterns that match `filename`
pub fn suggest_patterns(filename: &str) -> Vec<&'static BuiltinPattern> {
    BUILTIN_PATTERNS
        .iter()
        .filter(|builtin| test_pattern(builtin.pattern, filename).is_success())
        .collect()
}
