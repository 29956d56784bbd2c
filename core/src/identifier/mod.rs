//! Filename to identifier resolution.
//!
//! Resolution runs an ordered chain of stages over the filename stem
//! (directory and final extension removed). The first stage that yields a
//! non-empty raw identifier wins, and the result is passed through
//! [`normalize`].
//!
//! 1. custom override patterns from settings
//! 2. the site dictionary (Tokyo-Hot, Caribbeancom, HEYZO, ...)
//! 3. subtitle releases and Japanese-script names
//! 4. names with `-`/`_` separators
//! 5. fused names without separators

mod rules;
pub mod validator;

use crate::error::classification::FaultClass;
use crate::settings::ParserSettings;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Canonical catalog identifier derived from a filename
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    value: String,
    uncensored: bool,
}

impl Identifier {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_uncensored(&self) -> bool {
        self.uncensored
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

type Stage = fn(&str) -> Option<String>;

const BUILTIN_STAGES: [(&str, Stage); 4] = [
    ("site_rule", rules::site_rule),
    ("subtitle", rules::subtitle_release),
    ("separated", rules::separated_code),
    ("fused", rules::fused_code),
];

lazy_static! {
    static ref UNSEPARATED_CODE: Regex =
        Regex::new(r"^([a-zA-Z]{3,})(\d{3,})$").expect("valid unseparated pattern");
    static ref CATALOG_NUMBER: Regex = Regex::new(r"^\d{6,}$").expect("valid catalog pattern");
    static ref DATED_RELEASE: Regex =
        Regex::new(r"^\d{6}[-_]\d{2,3}$").expect("valid dated pattern");
    static ref TOKYO_HOT_LABEL: Regex =
        Regex::new(r"(?i)^(cz|gedo|k|n|red-|se)\d{2,4}$").expect("valid tokyo-hot pattern");
    static ref UNCENSORED_LABEL: Regex = Regex::new(
        r"(?i)^(heyzo-.+|xxx-av-.+|heydouga-.+|x-art\.\d{2}\.\d{2}\.\d{2})$"
    )
    .expect("valid uncensored pattern");
}

const STRIPPED_PREFIXES: [&str; 2] = ["ppv-", "fc-"];

/// Canonical form of a raw identifier.
///
/// Underscores become dashes, leading `ppv-`/`fc-` tokens and trailing
/// dashes are dropped, a dash is inserted between 3+ letters and 3+ digits,
/// and everything else is uppercased. Applied until stable, so
/// `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let mut current = normalize_once(raw);
    loop {
        let next = normalize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn normalize_once(raw: &str) -> String {
    let mut text = raw.replace('_', "-");

    while let Some(prefix) = STRIPPED_PREFIXES
        .iter()
        .find(|prefix| text.to_ascii_lowercase().starts_with(*prefix))
    {
        text.replace_range(..prefix.len(), "");
    }

    let text = text.trim_end_matches('-');
    match UNSEPARATED_CODE.captures(text) {
        Some(caps) => format!("{}-{}", caps[1].to_uppercase(), &caps[2]),
        None => text.to_uppercase(),
    }
}

/// Filename with directories and the final extension removed
fn file_stem(filename: &str) -> &str {
    let name = Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(filename);
    match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name,
    }
}

/// Resolves filenames to identifiers.
///
/// Custom patterns are compiled once at construction; the parser is
/// read-only afterwards and can be shared between workers.
#[derive(Debug, Clone)]
pub struct IdentifierParser {
    custom_patterns: Vec<Regex>,
    uncensored_prefixes: Vec<String>,
}

impl IdentifierParser {
    pub fn new(settings: &ParserSettings) -> Self {
        let custom_patterns = settings
            .custom_number_patterns
            .split_whitespace()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    tracing::warn!(pattern, error = %e, "Skipping invalid custom pattern");
                    None
                }
            })
            .collect();

        let uncensored_prefixes = settings
            .uncensored_prefixes
            .split(',')
            .map(|prefix| prefix.trim().to_uppercase())
            .filter(|prefix| !prefix.is_empty())
            .collect();

        Self {
            custom_patterns,
            uncensored_prefixes,
        }
    }

    /// Number of custom patterns that compiled
    pub fn custom_pattern_count(&self) -> usize {
        self.custom_patterns.len()
    }

    /// Identifier for `filename`, or `None` when nothing usable is found
    pub fn resolve(&self, filename: &str) -> Option<String> {
        let stem = file_stem(filename);

        let raw = self.custom_match(stem).or_else(|| {
            BUILTIN_STAGES.iter().find_map(|(stage, extract)| {
                let raw = extract(stem).filter(|raw| !raw.is_empty())?;
                tracing::trace!(stage, raw = %raw, "Extraction stage matched");
                Some(raw)
            })
        });

        match raw.map(|raw| normalize(&raw)).filter(|id| !id.is_empty()) {
            Some(id) => {
                tracing::debug!(filename, identifier = %id, "Resolved identifier");
                Some(id)
            }
            None => {
                tracing::warn!(filename, class = %FaultClass::Unparsable, "No identifier found");
                None
            }
        }
    }

    /// Resolve and classify `filename`
    pub fn identify(&self, filename: &str) -> Option<Identifier> {
        let value = self.resolve(filename)?;
        let uncensored = self.is_uncensored(&value);
        Some(Identifier { value, uncensored })
    }

    /// Whether `identifier` belongs to an uncensored release family
    pub fn is_uncensored(&self, identifier: &str) -> bool {
        if CATALOG_NUMBER.is_match(identifier)
            || DATED_RELEASE.is_match(identifier)
            || TOKYO_HOT_LABEL.is_match(identifier)
            || UNCENSORED_LABEL.is_match(identifier)
        {
            return true;
        }

        let upper = identifier.to_uppercase();
        self.uncensored_prefixes
            .iter()
            .any(|prefix| upper.starts_with(prefix.as_str()))
    }

    /// First custom pattern with a usable last match. A pattern with groups
    /// uses the first group and is skipped when that group is empty.
    fn custom_match(&self, stem: &str) -> Option<String> {
        self.custom_patterns.iter().find_map(|pattern| {
            let caps = pattern.captures_iter(stem).last()?;
            let found = if pattern.captures_len() > 1 {
                caps.get(1)
            } else {
                caps.get(0)
            };
            found
                .map(|m| m.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    }
}

impl Default for IdentifierParser {
    fn default() -> Self {
        Self::new(&ParserSettings::default())
    }
}
