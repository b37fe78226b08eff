//! Scientific name analysis.
//!
//! Turns a raw `(code, name, authorship)` triple into a [`NameKey`] plus the parsed
//! parts of the name. Informal markers (`aff.`, `cf.`, `sp.`, `?`, phrase-name
//! vouchers) are stripped from the key and kept as [`NameMarker`]s on the result.

use crate::bio::name_key::NameKey;
use crate::bio::rank::{NameType, NomenclaturalCode, TaxonomicRank};
use crate::{BackboneError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Informal annotations found in a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NameMarker {
    Affinity,
    Confer,
    Question,
    Species,
    SpeciesPlural,
    Indeterminate,
    Phrase,
}

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]|\{[^}]*\}").expect("valid regex"));
static VIRUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(virus|viroid)(es)?\b|\bphages?\b|\bictv\b").expect("valid regex")
});
static PHRASE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?P<genus>\p{Lu}[\p{L}\-]+)\s+(?:(?P<specific>\p{Ll}[\p{Ll}\-]+)\s+)?(?P<marker>sp|subsp|ssp|var)\.\s+(?P<phrase>[\p{Lu}0-9'"][^()]*?)?\s*(?:\((?P<voucher>[^)]+)\))?$"#,
    )
    .expect("valid regex")
});
static AFFINITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^|\s)aff\.?(\s|$)").expect("valid regex"));
static CONFER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^|\s)(cf|cfr|conf)\.?(\s|$)").expect("valid regex"));
static SPECIES_PLURAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^|\s)spp\.?(\s|$)").expect("valid regex"));
static SPECIES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^|\s)sp\.?(\s|$)").expect("valid regex"));
static INDETERMINATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(^|\s)(indet|undet)[#!?.]?(\s|$)").expect("valid regex"));
static SUBGENUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s\(\s*\p{L}+\s*\)\s").expect("valid regex"));
static RANK_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|\s)(?P<marker>nothosubsp\.?|subsp\.?|ssp\.?|subvar\.?|var\.?|forma|f\.|cv\.?)(\s|$)")
        .expect("valid regex")
});
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)incertae\s+sedis|species\s+inquirenda|\bunplaced\b").expect("valid regex")
});
static HYBRID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|\s)[x×](\s|$)|^×").expect("valid regex"));
static CULTIVAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\p{Lu}[\p{L}\-]+(?:\s+\p{Ll}[\p{Ll}\-]+)*\s+'(?P<cultivar>[^']+)'$")
        .expect("valid regex")
});
static HIGHER_SCIENTIFIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\p{Lu}[\p{L}\-]+$").expect("valid regex"));
static LOWER_SCIENTIFIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\p{Lu}[\p{L}\-]+\s+\p{Ll}[\p{Ll}\-]+(\s+\p{Ll}[\p{Ll}\-]+)?$")
        .expect("valid regex")
});
static EMBEDDED_AUTHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<name>\p{Lu}[\p{L}\-]+(?:\s+\p{Ll}[\p{Ll}\-]+){1,2})\s+(?P<author>[\p{Lu}(].*)$",
    )
    .expect("valid regex")
});
static NON_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[^A-Za-z0-9'"\- ]+"#).expect("valid regex"));
static VOUCHER_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ ,&.]").expect("valid regex"));

/// The result of analysing a name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysedName {
    pub key: NameKey,
    /// Cleaned display form of the name, markers kept
    pub display: String,
    /// Cleaned display form of the supplied author
    pub display_author: Option<String>,
    pub genus: Option<String>,
    pub specific_epithet: Option<String>,
    pub infraspecific_epithet: Option<String>,
    pub cultivar: Option<String>,
    pub phrase: Option<String>,
    pub voucher: Option<String>,
    pub markers: BTreeSet<NameMarker>,
}

impl AnalysedName {
    pub fn has_marker(&self, marker: NameMarker) -> bool {
        self.markers.contains(&marker)
    }

    /// Genus plus specific epithet, without markers or author
    pub fn is_binomial(&self) -> bool {
        self.genus.is_some() && self.specific_epithet.is_some()
    }

    /// Rank suggested by the shape of the name alone
    pub fn implied_rank(&self) -> Option<TaxonomicRank> {
        if !self.key.rank.is_unranked() {
            return Some(self.key.rank);
        }
        match (
            &self.genus,
            &self.specific_epithet,
            &self.infraspecific_epithet,
        ) {
            (Some(_), Some(_), Some(_)) => Some(TaxonomicRank::Subspecies),
            (Some(_), Some(_), None) => Some(TaxonomicRank::Species),
            _ => None,
        }
    }

    /// Name with markers and author removed, as it should appear in a canonical listing
    pub fn canonical(&self) -> String {
        match (&self.genus, &self.specific_epithet, &self.infraspecific_epithet) {
            (Some(g), Some(s), Some(i)) if !self.has_marker(NameMarker::Phrase) => {
                format!("{} {} {}", g, s, i)
            }
            (Some(g), Some(s), None) if !self.has_marker(NameMarker::Phrase) => {
                format!("{} {}", g, s)
            }
            _ => self.display.clone(),
        }
    }
}

/// Name analyser. Stateless; every call is deterministic and does no I/O.
#[derive(Debug, Clone, Default)]
pub struct NameAnalyser;

impl NameAnalyser {
    pub fn new() -> Self {
        Self
    }

    /// Analyse a name, inferring the rank from the name if not supplied
    pub fn analyse(
        &self,
        code: Option<NomenclaturalCode>,
        scientific_name: &str,
        authorship: Option<&str>,
        rank: Option<TaxonomicRank>,
    ) -> Result<AnalysedName> {
        let display_author = authorship
            .map(collapse_whitespace)
            .filter(|a| !a.is_empty());
        let mut display = normalise(scientific_name);
        if let Some(author) = &display_author {
            display = strip_author(&display, author);
        }
        if display.is_empty() {
            return Err(BackboneError::Parse("empty scientific name".to_string()));
        }

        let given_rank = rank.filter(|r| !r.is_unranked());
        let mut markers = BTreeSet::new();

        if code == Some(NomenclaturalCode::Virus) {
            let key = NameKey::new(
                code,
                key_name(&display),
                display_author.as_deref().and_then(normalise_author),
                given_rank.unwrap_or_default(),
                NameType::Virus,
            );
            return Ok(AnalysedName {
                key,
                display,
                display_author,
                genus: None,
                specific_epithet: None,
                infraspecific_epithet: None,
                cultivar: None,
                phrase: None,
                voucher: None,
                markers,
            });
        }
        if VIRUS.is_match(&display) {
            return Err(BackboneError::Parse(format!(
                "unparsable virus-like name: {}",
                display
            )));
        }

        let mut work = display.clone();
        if work.contains('?') {
            markers.insert(NameMarker::Question);
            work = collapse_whitespace(&work.replace('?', " "));
        }

        if let Some(caps) = PHRASE_NAME.captures(&work) {
            let phrase = caps.name("phrase").map(|m| m.as_str().trim().to_string());
            let voucher = caps.name("voucher").map(|m| m.as_str().trim().to_string());
            if phrase.is_some() || voucher.is_some() {
                markers.insert(NameMarker::Phrase);
                let genus = caps["genus"].to_string();
                let specific = caps.name("specific").map(|m| m.as_str().to_string());
                let marker_rank = match &caps["marker"] {
                    "subsp" | "ssp" => TaxonomicRank::Subspecies,
                    "var" => TaxonomicRank::Variety,
                    _ => TaxonomicRank::Species,
                };
                let mut text = genus.clone();
                if let Some(s) = &specific {
                    text.push(' ');
                    text.push_str(s);
                }
                text.push_str(" sp ");
                if let Some(p) = &phrase {
                    text.push_str(p);
                }
                if let Some(v) = &voucher {
                    text.push(' ');
                    text.push_str(&VOUCHER_NOISE.replace_all(v, ""));
                }
                let key = NameKey::new(
                    code,
                    key_name(&text),
                    display_author.as_deref().and_then(normalise_author),
                    given_rank.unwrap_or(marker_rank),
                    NameType::Informal,
                );
                return Ok(AnalysedName {
                    key,
                    display,
                    display_author,
                    genus: Some(genus),
                    specific_epithet: specific,
                    infraspecific_epithet: None,
                    cultivar: None,
                    phrase,
                    voucher,
                    markers,
                });
            }
        }

        for (pattern, marker) in [
            (&*AFFINITY, NameMarker::Affinity),
            (&*CONFER, NameMarker::Confer),
            (&*SPECIES_PLURAL, NameMarker::SpeciesPlural),
            (&*SPECIES, NameMarker::Species),
            (&*INDETERMINATE, NameMarker::Indeterminate),
        ] {
            if pattern.is_match(&work) {
                markers.insert(marker);
                work = remove_all(pattern, &work);
            }
        }

        let mut padded = format!(" {} ", work);
        while SUBGENUS.is_match(&padded) {
            padded = SUBGENUS.replace(&padded, " ").into_owned();
        }
        work = collapse_whitespace(&padded);

        let mut marker_rank = None;
        if let Some(caps) = RANK_MARKER.captures(&work) {
            marker_rank = TaxonomicRank::parse(&caps["marker"]);
            work = remove_all(&RANK_MARKER, &work);
        }

        let hybrid = HYBRID.is_match(&work);
        let mut authorship_key = display_author.as_deref().and_then(normalise_author);
        if authorship_key.is_none() && !hybrid {
            if let Some(caps) = EMBEDDED_AUTHOR.captures(&work) {
                authorship_key = normalise_author(&caps["author"]);
                work = caps["name"].to_string();
            }
        }

        let cultivar = CULTIVAR
            .captures(&work)
            .map(|caps| caps["cultivar"].trim().to_string());

        let name_type = if PLACEHOLDER.is_match(&work) {
            NameType::Placeholder
        } else if hybrid {
            NameType::Hybrid
        } else if cultivar.is_some() {
            NameType::Cultivar
        } else if !work.chars().any(char::is_alphabetic) {
            NameType::NoName
        } else if markers.contains(&NameMarker::Indeterminate) {
            NameType::Doubtful
        } else if !markers.is_empty() {
            NameType::Informal
        } else if HIGHER_SCIENTIFIC.is_match(&work) || LOWER_SCIENTIFIC.is_match(&work) {
            NameType::Scientific
        } else {
            NameType::Informal
        };

        let (genus, specific_epithet, infraspecific_epithet) = name_parts(&work);
        let key = NameKey::new(
            code,
            key_name(&work),
            authorship_key,
            given_rank.or(marker_rank).unwrap_or_default(),
            name_type,
        );

        Ok(AnalysedName {
            key,
            display,
            display_author,
            genus,
            specific_epithet,
            infraspecific_epithet,
            cultivar,
            phrase: None,
            voucher: None,
            markers,
        })
    }

    /// Analyse an already analysed name's display form
    pub fn reanalyse(&self, name: &AnalysedName) -> Result<AnalysedName> {
        self.analyse(
            name.key.code,
            &name.display,
            name.display_author.as_deref(),
            Some(name.key.rank),
        )
    }
}

/// Analyse with a fresh analyser
pub fn analyse(
    code: Option<NomenclaturalCode>,
    scientific_name: &str,
    authorship: Option<&str>,
) -> Result<NameKey> {
    NameAnalyser::new()
        .analyse(code, scientific_name, authorship, None)
        .map(|a| a.key)
}

/// Collapse runs of whitespace into single spaces and trim
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Upper-case, whitespace-collapsed comparison form
pub fn insensitive(s: &str) -> String {
    collapse_whitespace(s).to_uppercase()
}

/// Author comparison form: punctuation and spacing removed, initials kept
pub fn normalise_author(author: &str) -> Option<String> {
    let joined: Vec<String> = author
        .split_whitespace()
        .map(|token| match token.to_lowercase().as_str() {
            "and" | "et" => "&".to_string(),
            _ => token.to_string(),
        })
        .collect();
    let cleaned: String = joined
        .concat()
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '(' | ')' | '&'))
        .flat_map(char::to_uppercase)
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn normalise(name: &str) -> String {
    let stripped = BRACKETED.replace_all(name, " ");
    stripped
        .split_whitespace()
        .map(|token| if token == "and" { "&" } else { token })
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_author(name: &str, author: &str) -> String {
    let Some(prefix) = name.strip_suffix(author) else {
        return strip_author_year(name, author);
    };
    if prefix.ends_with(' ') && !prefix.trim().is_empty() {
        prefix.trim_end().trim_end_matches(',').trim_end().to_string()
    } else {
        name.to_string()
    }
}

fn strip_author_year(name: &str, author: &str) -> String {
    if let Some((head, year)) = name.rsplit_once(',') {
        let year = year.trim();
        if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
            let stripped = strip_author(head.trim_end(), author);
            if stripped != head.trim_end() {
                return stripped;
            }
        }
    }
    name.to_string()
}

fn remove_all(pattern: &Regex, s: &str) -> String {
    let mut current = s.to_string();
    loop {
        let next = pattern.replace_all(&current, " ").into_owned();
        if next == current {
            return collapse_whitespace(&current);
        }
        current = next;
    }
}

fn key_name(s: &str) -> String {
    collapse_whitespace(&NON_NAME.replace_all(s, "")).to_uppercase()
}

fn name_parts(work: &str) -> (Option<String>, Option<String>, Option<String>) {
    let tokens: Vec<&str> = work
        .split_whitespace()
        .filter(|t| !matches!(*t, "x" | "×") && !t.starts_with('\''))
        .collect();
    let genus = tokens
        .first()
        .filter(|t| t.chars().next().is_some_and(char::is_uppercase))
        .map(|t| t.to_string());
    if genus.is_none() {
        return (None, None, None);
    }
    let specific = tokens
        .get(1)
        .copied()
        .filter(|t| is_epithet(t))
        .map(str::to_string);
    let infra = specific.as_ref().and(
        tokens
            .get(2)
            .copied()
            .filter(|t| is_epithet(t))
            .map(str::to_string),
    );
    (genus, specific, infra)
}

fn is_epithet(token: &str) -> bool {
    token.chars().all(|c| c.is_lowercase() || c == '-')
}
