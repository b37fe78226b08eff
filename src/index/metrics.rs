//! Match confidence between a query classification and an index entry
use crate::bio::TaxonomicRank;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Two matches within this distance are considered equally good
pub const MATCH_PROXIMITY: f64 = 0.1;
pub const DEFAULT_PRIORITY: i32 = 1000;
pub const DEFAULT_MATCH: f64 = 1.0;

/// Per-term weights: kingdom, phylum, class, order, family, genus,
/// specific epithet, infraspecific epithet, authorship, rank
const WEIGHTS: [f64; 10] = [4.0, 1.0, 1.0, 1.0, 1.5, 2.0, 1.0, 1.0, 5.0, 0.5];
const SYNONYM_WEIGHTS: [f64; 10] = [2.0, 1.0, 1.0, 1.0, 1.5, 0.5, 1.0, 1.0, 5.0, 0.5];

const KINGDOM_TERM: usize = 0;
const RANK_TERM: usize = 9;

/// Comparable parts of one side of a match
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchTerms<'a> {
    pub kingdom: Option<&'a str>,
    pub phylum: Option<&'a str>,
    pub class: Option<&'a str>,
    pub order: Option<&'a str>,
    pub family: Option<&'a str>,
    pub genus: Option<&'a str>,
    pub specific_epithet: Option<&'a str>,
    pub infraspecific_epithet: Option<&'a str>,
    pub authorship: Option<&'a str>,
    pub rank: Option<TaxonomicRank>,
}

impl<'a> MatchTerms<'a> {
    fn strings(&self) -> [Option<&'a str>; 9] {
        [
            self.kingdom,
            self.phylum,
            self.class,
            self.order,
            self.family,
            self.genus,
            self.specific_epithet,
            self.infraspecific_epithet,
            self.authorship,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchMetrics {
    /// Provider priority of the matched taxon
    pub priority: i32,
    /// Weighted similarity in 0.0..=1.0
    #[serde(rename = "matchScore")]
    pub match_score: f64,
}

impl Default for MatchMetrics {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            match_score: DEFAULT_MATCH,
        }
    }
}

impl MatchMetrics {
    pub fn compute(query: &MatchTerms, result: &MatchTerms, synonym: bool, priority: i32) -> Self {
        let weights = if synonym { &SYNONYM_WEIGHTS } else { &WEIGHTS };
        let (mut weight, mut score) = if synonym { (1.0, 1.0) } else { (0.1, 0.1) };

        for (i, (q, r)) in query.strings().iter().zip(result.strings()).enumerate() {
            if let Some(term) = compare_term(i, *q, r) {
                weight += weights[i];
                score += weights[i] * term;
            }
        }
        if let (Some(q), Some(r)) = (query.rank, result.rank) {
            if !q.is_unranked() && !r.is_unranked() {
                weight += weights[RANK_TERM];
                score += weights[RANK_TERM] * rank_similarity(q, r);
            }
        }

        Self {
            priority,
            match_score: score / weight,
        }
    }

    /// Match score decides unless the two are within `MATCH_PROXIMITY`, then priority does.
    ///
    /// Not transitive; use [`best_first`] to rank several candidates.
    pub fn compare(&self, other: &Self) -> Ordering {
        if (self.match_score - other.match_score).abs() > MATCH_PROXIMITY {
            self.match_score
                .partial_cmp(&other.match_score)
                .unwrap_or(Ordering::Equal)
        } else {
            self.priority.cmp(&other.priority)
        }
    }
}

/// Order items best first by repeatedly selecting the best remaining one
pub fn best_first<T>(mut items: Vec<T>, metrics: impl Fn(&T) -> MatchMetrics) -> Vec<T> {
    let mut ranked = Vec::with_capacity(items.len());
    while !items.is_empty() {
        let mut best = 0;
        for i in 1..items.len() {
            if metrics(&items[i]).compare(&metrics(&items[best])) == Ordering::Greater {
                best = i;
            }
        }
        ranked.push(items.remove(best));
    }
    ranked
}

fn compare_term(index: usize, query: Option<&str>, result: Option<&str>) -> Option<f64> {
    let query = query.map(str::trim).filter(|q| !q.is_empty())?;
    let similarity = match result.map(str::trim).filter(|r| !r.is_empty()) {
        None if index == KINGDOM_TERM => 0.01,
        None => 0.5,
        Some(result) if result.eq_ignore_ascii_case(query) => 1.0,
        Some(result) => smith_waterman_gotoh(&query.to_uppercase(), &result.to_uppercase()),
    };
    Some(similarity)
}

fn rank_similarity(query: TaxonomicRank, result: TaxonomicRank) -> f64 {
    let scale = (TaxonomicRank::Phylum.id() - TaxonomicRank::Kingdom.id()) as f64;
    let distance = (query.id() as f64 - result.id() as f64).abs();
    (1.0 - 0.8 * distance / scale).max(0.01)
}

const SWG_MATCH: f64 = 5.0;
const SWG_APPROXIMATE: f64 = 3.0;
const SWG_MISMATCH: f64 = -3.0;
const SWG_GAP_OPEN: f64 = 5.0;
const SWG_GAP_EXTEND: f64 = 1.0;
const SWG_WINDOW: usize = 100;

/// Characters that are easily confused for one another
const APPROXIMATE: [&str; 7] = ["dt", "gj", "lr", "mn", "bpv", "aeiou", ",."];

fn substitution(x: char, y: char) -> f64 {
    let (x, y) = (x.to_ascii_lowercase(), y.to_ascii_lowercase());
    if x == y {
        SWG_MATCH
    } else if APPROXIMATE.iter().any(|group| group.contains(x) && group.contains(y)) {
        SWG_APPROXIMATE
    } else {
        SWG_MISMATCH
    }
}

/// Cost of a gap spanning `length` characters
fn gap(length: usize) -> f64 {
    SWG_GAP_OPEN + SWG_GAP_EXTEND * (length - 1) as f64
}

/// Smith-Waterman-Gotoh local alignment similarity with windowed affine gaps,
/// normalised by the best possible score of the shorter string
pub fn smith_waterman_gotoh(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    // Row and column 0 are virtual empty prefixes
    let mut d = vec![vec![0.0f64; b.len() + 1]; a.len() + 1];
    let mut best = 0.0f64;
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let mut cell = 0.0f64.max(d[i - 1][j - 1] + substitution(a[i - 1], b[j - 1]));
            for k in 1..i.min(SWG_WINDOW + 1) {
                cell = cell.max(d[i - k][j] - gap(k));
            }
            for k in 1..j.min(SWG_WINDOW + 1) {
                cell = cell.max(d[i][j - k] - gap(k));
            }
            d[i][j] = cell;
            best = best.max(cell);
        }
    }

    let max_distance = a.len().min(b.len()) as f64 * SWG_MATCH.max(SWG_GAP_OPEN);
    best / max_distance
}
