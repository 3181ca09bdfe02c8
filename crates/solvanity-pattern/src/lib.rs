//! SolVanity Pattern Matching Engine
//!
//! Prefix and multi-suffix matching over Base58 addresses, with
//! configuration-time validation and difficulty estimates.

mod difficulty;
mod matcher;

pub use difficulty::{
    calculate_difficulty, estimate_time_50pct, format_difficulty, format_duration,
    match_probability,
};
pub use matcher::{
    normalize, MatchOutcome, PatternError, SearchPattern, ADDRESS_ALPHABET, MAX_ADDRESS_LEN,
};
