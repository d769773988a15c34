//! Identity resolution against the fixed roster
//!
//! Free-text officer names arrive in two shapes: interactive login input
//! ("Maj PM Eduardo Mosna Xavier") and officer fields stored by older
//! clients with minor spelling drift. Both resolve to one canonical roster
//! entry through the same scoring function, with different acceptance
//! thresholds per calling convention.

use std::collections::HashSet;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::config::Officer;
use crate::error::ScheduleError;

/// Minimum score for interactive login input. Below this the input is
/// rejected outright, never mapped to the nearest officer.
pub const LOGIN_THRESHOLD: f64 = 0.65;

/// Minimum score when reconciling stored officer fields. Lower than the
/// login threshold: stored rows name known-valid officers with spelling
/// drift, and dropping their data costs more than a rare misattribution.
pub const RECONCILE_THRESHOLD: f64 = 0.62;

struct Entry {
    officer: Officer,
    normalized: String,
    tokens: Vec<String>,
}

/// Resolves free-text "rank + name" input to one roster officer.
pub struct IdentityResolver {
    entries: Vec<Entry>,
    rank_tokens: HashSet<String>,
}

impl IdentityResolver {
    /// Build a resolver over the roster. Rank prefixes recognized during
    /// normalization are derived from the roster's own rank strings.
    pub fn new(roster: &[Officer]) -> Self {
        let mut rank_tokens = HashSet::new();
        for officer in roster {
            for token in normalize(&officer.rank).split_whitespace() {
                rank_tokens.insert(token.to_string());
            }
        }

        let entries = roster
            .iter()
            .map(|officer| {
                let normalized = normalize(&officer.canonical_name);
                let tokens = normalized
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                Entry {
                    officer: officer.clone(),
                    normalized,
                    tokens,
                }
            })
            .collect();

        Self {
            entries,
            rank_tokens,
        }
    }

    /// Score `input` against every roster entry and return the best match.
    ///
    /// Thresholds are the caller's concern; this is the swappable seam.
    pub fn resolve(&self, input: &str) -> Option<(&Officer, f64)> {
        let tokens = self.input_tokens(input);
        if tokens.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .map(|entry| (&entry.officer, score(&tokens, &entry.tokens)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Interactive login: best match at `LOGIN_THRESHOLD` or an error.
    pub fn resolve_login(&self, input: &str) -> Result<&Officer, ScheduleError> {
        match self.resolve(input) {
            Some((officer, best)) if best >= LOGIN_THRESHOLD => Ok(officer),
            _ => Err(ScheduleError::IdentityNotResolved(input.to_string())),
        }
    }

    /// Stored-row reconciliation: exact normalized match first, fuzzy
    /// fallback at `RECONCILE_THRESHOLD`. `None` drops the record.
    pub fn resolve_stored(&self, input: &str) -> Option<&Officer> {
        let tokens = self.input_tokens(input);
        if tokens.is_empty() {
            return None;
        }
        let joined = tokens.join(" ");

        if let Some(entry) = self.entries.iter().find(|e| e.normalized == joined) {
            return Some(&entry.officer);
        }

        self.entries
            .iter()
            .map(|entry| (&entry.officer, score(&tokens, &entry.tokens)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .filter(|(_, best)| *best >= RECONCILE_THRESHOLD)
            .map(|(officer, _)| officer)
    }

    /// Normalize and strip a recognized rank prefix from raw input.
    fn input_tokens(&self, input: &str) -> Vec<String> {
        let normalized = normalize(input);
        let mut tokens: Vec<String> = normalized
            .split_whitespace()
            .map(str::to_string)
            .collect();

        // never strip the whole input; a lone rank token is still a name
        while tokens.len() > 1 && self.rank_tokens.contains(tokens[0].as_str()) {
            tokens.remove(0);
        }

        tokens
    }
}

/// Strip accents, lowercase, collapse whitespace.
fn normalize(input: &str) -> String {
    let stripped: String = input
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Token-set similarity: Jaccard over name tokens, with bonuses when the
/// first tokens match (+0.10) and when the last tokens match (+0.15).
fn score(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();

    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    let mut result = intersection / union;

    if a.first() == b.first() {
        result += 0.10;
    }
    if a.last() == b.last() {
        result += 0.15;
    }

    result
}
