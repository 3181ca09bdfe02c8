//! Prefix/suffix pattern matching

use thiserror::Error;

/// Alphabet every pattern character must come from (Base58)
pub const ADDRESS_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Longest Base58 encoding of a 32-byte key
pub const MAX_ADDRESS_LEN: usize = 44;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("No search target: give a prefix or at least one suffix")]
    NoTarget,
    #[error("Invalid character '{ch}' in \"{fragment}\" (Base58 excludes 0, O, I and l)")]
    InvalidCharacter { ch: char, fragment: String },
    #[error("Pattern \"{fragment}\" is too long (max {max} characters)")]
    TooLong { fragment: String, max: usize },
}

/// Normalize text for case-insensitive comparison.
///
/// Addresses and patterns are ASCII, so ASCII lowercasing is the single case
/// both sides are folded to.
pub fn normalize(value: &str) -> String {
    value.to_ascii_lowercase()
}

/// Result of testing one address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome<'a> {
    pub prefix_ok: bool,
    pub suffix_ok: bool,
    /// First configured suffix (insertion order) the address ends with, or ""
    pub matched_suffix: &'a str,
}

impl MatchOutcome<'_> {
    /// Both halves hold
    #[inline]
    pub fn is_match(&self) -> bool {
        self.prefix_ok && self.suffix_ok
    }
}

/// A validated search pattern.
///
/// Pattern strings are normalized once at construction so the per-attempt
/// check never allocates.
#[derive(Debug, Clone)]
pub struct SearchPattern {
    prefix: String,
    suffixes: Vec<String>,
    match_case: bool,
    cmp_prefix: String,
    cmp_suffixes: Vec<String>,
}

impl SearchPattern {
    /// Validate and normalize a prefix and a list of suffixes.
    ///
    /// Empty suffixes and repeated suffixes are dropped; the remaining ones
    /// keep their insertion order.
    pub fn new<I, S>(prefix: &str, suffixes: I, match_case: bool) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefix = prefix.trim().to_string();
        let mut kept: Vec<String> = Vec::new();
        for suffix in suffixes {
            let suffix = suffix.into().trim().to_string();
            if suffix.is_empty() {
                continue;
            }
            let duplicate = kept.iter().any(|existing| {
                if match_case {
                    *existing == suffix
                } else {
                    existing.eq_ignore_ascii_case(&suffix)
                }
            });
            if !duplicate {
                kept.push(suffix);
            }
        }

        if prefix.is_empty() && kept.is_empty() {
            return Err(PatternError::NoTarget);
        }

        validate_fragment(&prefix, match_case)?;
        for suffix in &kept {
            validate_fragment(suffix, match_case)?;
        }

        let longest_suffix = kept.iter().map(String::len).max().unwrap_or(0);
        if prefix.len() + longest_suffix > MAX_ADDRESS_LEN {
            let fragment = match kept.iter().max_by_key(|s| s.len()) {
                Some(suffix) if !prefix.is_empty() => format!("{}...{}", prefix, suffix),
                Some(suffix) => suffix.clone(),
                None => prefix.clone(),
            };
            return Err(PatternError::TooLong {
                fragment,
                max: MAX_ADDRESS_LEN,
            });
        }

        let (cmp_prefix, cmp_suffixes) = if match_case {
            (prefix.clone(), kept.clone())
        } else {
            (normalize(&prefix), kept.iter().map(|s| normalize(s)).collect())
        };

        Ok(Self {
            prefix,
            suffixes: kept,
            match_case,
            cmp_prefix,
            cmp_suffixes,
        })
    }

    /// Prefix as entered
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Suffixes as entered, in insertion order
    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    pub fn match_case(&self) -> bool {
        self.match_case
    }

    /// Test an address against the pattern.
    ///
    /// A failing prefix returns immediately without any suffix comparison.
    #[inline]
    pub fn matches<'a>(&'a self, address: &str) -> MatchOutcome<'a> {
        if !self.has_prefix(address) {
            return MatchOutcome {
                prefix_ok: false,
                suffix_ok: false,
                matched_suffix: "",
            };
        }

        if self.cmp_suffixes.is_empty() {
            return MatchOutcome {
                prefix_ok: true,
                suffix_ok: true,
                matched_suffix: "",
            };
        }

        let hit = self
            .cmp_suffixes
            .iter()
            .position(|suffix| self.has_suffix(address, suffix));

        MatchOutcome {
            prefix_ok: true,
            suffix_ok: hit.is_some(),
            matched_suffix: hit.map(|i| self.suffixes[i].as_str()).unwrap_or(""),
        }
    }

    #[inline]
    fn has_prefix(&self, address: &str) -> bool {
        let pat = self.cmp_prefix.as_bytes();
        let addr = address.as_bytes();
        if self.match_case {
            addr.starts_with(pat)
        } else {
            addr.len() >= pat.len() && addr[..pat.len()].eq_ignore_ascii_case(pat)
        }
    }

    #[inline]
    fn has_suffix(&self, address: &str, suffix: &str) -> bool {
        let pat = suffix.as_bytes();
        let addr = address.as_bytes();
        if self.match_case {
            addr.ends_with(pat)
        } else {
            addr.len() >= pat.len() && addr[addr.len() - pat.len()..].eq_ignore_ascii_case(pat)
        }
    }
}

fn validate_fragment(fragment: &str, match_case: bool) -> Result<(), PatternError> {
    if fragment.len() > MAX_ADDRESS_LEN {
        return Err(PatternError::TooLong {
            fragment: fragment.to_string(),
            max: MAX_ADDRESS_LEN,
        });
    }

    for ch in fragment.chars() {
        let valid = if match_case {
            ADDRESS_ALPHABET.contains(ch)
        } else {
            ADDRESS_ALPHABET.contains(ch.to_ascii_lowercase())
                || ADDRESS_ALPHABET.contains(ch.to_ascii_uppercase())
        };

        if !valid {
            return Err(PatternError::InvalidCharacter {
                ch,
                fragment: fragment.to_string(),
            });
        }
    }

    Ok(())
}
