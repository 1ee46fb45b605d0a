//! Regulatory keyword matcher.
//!
//! Built once from configuration and shared read-only by the classifier and
//! the PDF agent.

use regex::Regex;

use crate::pipeline::types::ComplianceFlags;

/// Regulations scanned for when no list is configured.
pub const DEFAULT_REGULATIONS: &[&str] = &[
    "GDPR", "HIPAA", "PCI-DSS", "SOX", "FDA", "CCPA", "ISO 27001", "NIST",
];

/// Long-form names that count as a mention of the abbreviation.
const ALIASES: &[(&str, &str)] = &[
    ("gdpr", "General Data Protection Regulation"),
    ("hipaa", "Health Insurance Portability and Accountability Act"),
    ("pci_dss", "Payment Card Industry Data Security Standard"),
    ("sox", "Sarbanes-Oxley"),
    ("fda", "Food and Drug Administration"),
    ("ccpa", "California Consumer Privacy Act"),
];

#[derive(Debug, Clone)]
struct Regulation {
    name: String,
    flag_key: String,
    regex: Regex,
}

/// Case-insensitive whole-word matcher over a fixed regulation list.
#[derive(Debug, Clone)]
pub struct ComplianceMatcher {
    regulations: Vec<Regulation>,
}

impl ComplianceMatcher {
    /// Compile a matcher for the given regulation names.
    ///
    /// Separators inside a name (`PCI-DSS`, `ISO 27001`) match a space, a
    /// hyphen, an underscore or nothing.
    pub fn new<S: AsRef<str>>(names: &[S]) -> Result<Self, regex::Error> {
        let mut regulations = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref().trim();
            let tokens = tokenize(name);
            if tokens.is_empty() {
                continue;
            }
            let slug = tokens
                .iter()
                .map(|t| t.to_lowercase())
                .collect::<Vec<_>>()
                .join("_");

            let mut alternatives = vec![separator_pattern(&tokens)];
            for (alias_slug, long_form) in ALIASES {
                if *alias_slug == slug {
                    alternatives.push(separator_pattern(&tokenize(long_form)));
                }
            }
            let regex = Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|")))?;

            regulations.push(Regulation {
                name: name.to_string(),
                flag_key: format!("contains_{slug}_keywords"),
                regex,
            });
        }
        Ok(Self { regulations })
    }

    /// Matcher over [`DEFAULT_REGULATIONS`].
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_REGULATIONS).expect("default regulation patterns compile")
    }

    /// Flag every configured regulation against `text`.
    ///
    /// Every regulation gets a key, so an empty text yields all-false flags.
    pub fn scan(&self, text: &str) -> ComplianceFlags {
        let mut flags = ComplianceFlags::default();
        for regulation in &self.regulations {
            let hit = regulation.regex.is_match(text);
            flags.flags.insert(regulation.flag_key.clone(), hit);
            if hit {
                flags.matched_keywords.push(regulation.name.clone());
            }
        }
        flags
    }

    /// True if `text` mentions any configured regulation.
    pub fn mentions_any(&self, text: &str) -> bool {
        self.regulations.iter().any(|r| r.regex.is_match(text))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.regulations.iter().map(|r| r.name.as_str())
    }
}

fn tokenize(name: &str) -> Vec<&str> {
    name.split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|t| !t.is_empty())
        .collect()
}

fn separator_pattern(tokens: &[&str]) -> String {
    tokens
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join(r"[\s\-_]?")
}
