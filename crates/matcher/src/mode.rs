use serde::{Deserialize, Serialize};
use std::fmt;

/// How a keyword is tested against an item's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Allows partial matches within words. The keyword "cat" matches
    /// "cat", "catalog", and "concatenate".
    Broad,
    /// Requires a whole-word match. The keyword "cat" matches "cat" but
    /// not "catalog" or "concatenate".
    Exact,
    /// Unknown mode text, rejected at match time.
    #[serde(other)]
    Invalid,
}

impl MatchMode {
    pub fn parse(s: &str) -> MatchMode {
        match s.trim().to_lowercase().as_str() {
            "broad" => MatchMode::Broad,
            "exact" => MatchMode::Exact,
            _ => MatchMode::Invalid,
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchMode::Broad => "broad",
            MatchMode::Exact => "exact",
            MatchMode::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_modes() {
        assert_eq!(MatchMode::parse("broad"), MatchMode::Broad);
        assert_eq!(MatchMode::parse("Exact"), MatchMode::Exact);
        assert_eq!(MatchMode::parse(" broad "), MatchMode::Broad);
    }

    #[test]
    fn unknown_text_parses_as_invalid() {
        assert_eq!(MatchMode::parse(""), MatchMode::Invalid);
        assert_eq!(MatchMode::parse("fuzzy"), MatchMode::Invalid);
    }
}
