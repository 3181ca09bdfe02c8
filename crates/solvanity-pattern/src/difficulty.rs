//! Difficulty calculation for vanity patterns

use crate::matcher::{SearchPattern, ADDRESS_ALPHABET};

/// Probability that one random Base58 character equals `c` under the case rule
fn char_probability(c: char, match_case: bool) -> f64 {
    let alphabet_size = ADDRESS_ALPHABET.len() as f64;
    if match_case {
        return 1.0 / alphabet_size;
    }
    let variants = ADDRESS_ALPHABET
        .chars()
        .filter(|a| a.eq_ignore_ascii_case(&c))
        .count()
        .max(1);
    variants as f64 / alphabet_size
}

fn fragment_probability(fragment: &str, match_case: bool) -> f64 {
    fragment
        .chars()
        .map(|c| char_probability(c, match_case))
        .product()
}

/// Expected number of attempts to find one match.
///
/// Treats address characters as uniform and independent; alternative
/// suffixes add their probabilities (an upper bound for overlapping ones).
pub fn calculate_difficulty(pattern: &SearchPattern) -> f64 {
    let match_case = pattern.match_case();
    let prefix_p = fragment_probability(pattern.prefix(), match_case);
    let suffix_p = if pattern.suffixes().is_empty() {
        1.0
    } else {
        pattern
            .suffixes()
            .iter()
            .map(|s| fragment_probability(s, match_case))
            .sum::<f64>()
            .min(1.0)
    };
    1.0 / (prefix_p * suffix_p)
}

/// Format difficulty as human-readable string
pub fn format_difficulty(difficulty: f64) -> String {
    if difficulty >= 1e15 {
        format!("{:.2}P", difficulty / 1e15)
    } else if difficulty >= 1e12 {
        format!("{:.2}T", difficulty / 1e12)
    } else if difficulty >= 1e9 {
        format!("{:.2}G", difficulty / 1e9)
    } else if difficulty >= 1e6 {
        format!("{:.2}M", difficulty / 1e6)
    } else if difficulty >= 1e3 {
        format!("{:.2}K", difficulty / 1e3)
    } else {
        format!("{:.0}", difficulty)
    }
}

/// Probability of at least one match after `attempts` tries
pub fn match_probability(difficulty: f64, attempts: u64) -> f64 {
    if difficulty <= 0.0 {
        return 0.0;
    }
    1.0 - (-(attempts as f64) / difficulty).exp()
}

/// Estimate time to 50% probability of finding a match
pub fn estimate_time_50pct(difficulty: f64, keys_per_second: f64) -> f64 {
    if keys_per_second <= 0.0 {
        return f64::INFINITY;
    }
    (difficulty * std::f64::consts::LN_2) / keys_per_second
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() {
        "never".to_string()
    } else if seconds <= 0.0 {
        "now".to_string()
    } else if seconds < 1.0 {
        format!("{:.0}ms", seconds * 1000.0)
    } else if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        format!("{:.1}m", seconds / 60.0)
    } else if seconds < 86400.0 {
        format!("{:.1}h", seconds / 3600.0)
    } else if seconds < 86400.0 * 365.0 {
        format!("{:.1}d", seconds / 86400.0)
    } else {
        format!("{:.1}y", seconds / (86400.0 * 365.0))
    }
}
