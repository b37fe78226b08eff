//! Provider rule engine.
//!
//! Conditions are data: a closed tagged enum deserialized from provider JSON.
//! Regex conditions are compiled by [`TaxonCondition::compile`] when providers are
//! loaded, so a bad pattern fails before any record is read.

use crate::bio::names::{collapse_whitespace, insensitive, normalise_author, NameAnalyser};
use crate::bio::{NameKey, NameType, NomenclaturalCode, TaxonomicRank, TaxonomicStatus};
use crate::core::instance::TaxonConceptInstance;
use crate::{BackboneError, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// How string fields in a match condition are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameMatchType {
    #[default]
    Exact,
    /// Upper-case with whitespace collapsed
    Insensitive,
    /// Compared through the name analyser
    Normalised,
    /// Case-insensitive whole-string regular expression
    Regex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaxonCondition {
    Match(MatchTaxonCondition),
    And { and: Vec<TaxonCondition> },
    Or { or: Vec<TaxonCondition> },
}

impl TaxonCondition {
    pub fn matches(&self, instance: &TaxonConceptInstance, key: &NameKey) -> bool {
        match self {
            TaxonCondition::Match(condition) => condition.matches(instance, key),
            TaxonCondition::And { and } => and.iter().all(|c| c.matches(instance, key)),
            TaxonCondition::Or { or } => or.iter().any(|c| c.matches(instance, key)),
        }
    }

    /// Compile regular expressions and normalised forms
    pub fn compile(&mut self) -> Result<()> {
        match self {
            TaxonCondition::Match(condition) => condition.compile(),
            TaxonCondition::And { and: conditions } | TaxonCondition::Or { or: conditions } => {
                if conditions.is_empty() {
                    return Err(BackboneError::Config(
                        "and/or condition with no sub-conditions".to_string(),
                    ));
                }
                conditions.iter_mut().try_for_each(TaxonCondition::compile)
            }
        }
    }

    /// Human-readable rendering used in forbid explanations and issues
    pub fn explain(&self) -> String {
        match self {
            TaxonCondition::Match(condition) => condition.explain(),
            TaxonCondition::And { and } => join_explanations(and, " AND "),
            TaxonCondition::Or { or } => join_explanations(or, " OR "),
        }
    }
}

fn join_explanations(conditions: &[TaxonCondition], separator: &str) -> String {
    conditions
        .iter()
        .map(|c| match c {
            TaxonCondition::Match(_) => c.explain(),
            _ => format!("({})", c.explain()),
        })
        .collect::<Vec<_>>()
        .join(separator)
}

/// Field-by-field condition. Every field that is present must hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MatchTaxonCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nomenclatural_code: Option<NomenclaturalCode>,
    #[serde(default, rename = "datasetID", skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scientific_name_authorship: Option<String>,
    #[serde(default)]
    pub match_type: NameMatchType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxonomic_status: Option<TaxonomicStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nomenclatural_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_type: Option<NameType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxon_rank: Option<TaxonomicRank>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,

    #[serde(skip)]
    compiled: CompiledMatch,
}

#[derive(Debug, Clone, Default)]
struct CompiledMatch {
    name: Option<StringMatcher>,
    author: Option<StringMatcher>,
}

#[derive(Debug, Clone)]
enum StringMatcher {
    Exact(String),
    Insensitive(String),
    NormalisedName(String),
    NormalisedAuthor(Option<String>),
    Pattern(Regex),
}

impl MatchTaxonCondition {
    pub fn with_scientific_name(mut self, name: impl Into<String>, match_type: NameMatchType) -> Self {
        self.scientific_name = Some(name.into());
        self.match_type = match_type;
        self
    }

    pub fn with_authorship(mut self, author: impl Into<String>) -> Self {
        self.scientific_name_authorship = Some(author.into());
        self
    }

    pub fn with_status(mut self, status: TaxonomicStatus) -> Self {
        self.taxonomic_status = Some(status);
        self
    }

    pub fn with_rank(mut self, rank: TaxonomicRank) -> Self {
        self.taxon_rank = Some(rank);
        self
    }

    pub fn with_code(mut self, code: NomenclaturalCode) -> Self {
        self.nomenclatural_code = Some(code);
        self
    }

    pub fn with_dataset(mut self, dataset_id: impl Into<String>) -> Self {
        self.dataset_id = Some(dataset_id.into());
        self
    }

    pub fn with_name_type(mut self, name_type: NameType) -> Self {
        self.name_type = Some(name_type);
        self
    }

    /// Wrap into a condition, compiling patterns
    pub fn build(self) -> Result<TaxonCondition> {
        let mut condition = TaxonCondition::Match(self);
        condition.compile()?;
        Ok(condition)
    }

    fn compile(&mut self) -> Result<()> {
        self.compiled.name = self
            .scientific_name
            .as_deref()
            .map(|name| string_matcher(name, self.match_type, false))
            .transpose()?;
        self.compiled.author = self
            .scientific_name_authorship
            .as_deref()
            .map(|author| string_matcher(author, self.match_type, true))
            .transpose()?;
        Ok(())
    }

    pub fn matches(&self, instance: &TaxonConceptInstance, key: &NameKey) -> bool {
        if self.nomenclatural_code.is_some() && self.nomenclatural_code != instance.code {
            return false;
        }
        if self.dataset_id.is_some() && self.dataset_id != instance.dataset_id {
            return false;
        }
        if let Some(status) = self.taxonomic_status {
            if status != instance.status {
                return false;
            }
        }
        if let Some(status) = &self.nomenclatural_status {
            if !instance.nomenclatural_status.contains(status) {
                return false;
            }
        }
        if let Some(name_type) = self.name_type {
            if name_type != key.name_type {
                return false;
            }
        }
        if let Some(rank) = self.taxon_rank {
            if rank != instance.rank {
                return false;
            }
        }
        if self.year.is_some() && self.year != instance.year {
            return false;
        }
        if self.scientific_name.is_some() {
            match &self.compiled.name {
                Some(matcher) => {
                    if !matcher.matches(Some(&instance.scientific_name), Some(&key.scientific_name)) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if self.scientific_name_authorship.is_some() {
            match &self.compiled.author {
                Some(matcher) => {
                    if !matcher.matches(instance.authorship.as_deref(), key.authorship.as_deref()) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }

    pub fn explain(&self) -> String {
        let mut parts = Vec::new();
        if let Some(code) = &self.nomenclatural_code {
            parts.push(format!("nomenclaturalCode:{}", code));
        }
        if let Some(dataset) = &self.dataset_id {
            parts.push(format!("datasetID:{}", dataset));
        }
        if let Some(name) = &self.scientific_name {
            parts.push(format!("scientificName:{}", name));
        }
        if let Some(author) = &self.scientific_name_authorship {
            parts.push(format!("scientificNameAuthorship:{}", author));
        }
        if self.match_type != NameMatchType::Exact {
            let match_type = format!("{:?}", self.match_type).to_lowercase();
            parts.push(format!("matchType:{}", match_type));
        }
        if let Some(status) = &self.taxonomic_status {
            parts.push(format!("taxonomicStatus:{}", status));
        }
        if let Some(status) = &self.nomenclatural_status {
            parts.push(format!("nomenclaturalStatus:{}", status));
        }
        if let Some(name_type) = &self.name_type {
            parts.push(format!("nameType:{}", name_type));
        }
        if let Some(rank) = &self.taxon_rank {
            parts.push(format!("taxonRank:{}", rank));
        }
        if let Some(year) = &self.year {
            parts.push(format!("year:{}", year));
        }
        parts.join(" ")
    }
}

fn string_matcher(value: &str, match_type: NameMatchType, author: bool) -> Result<StringMatcher> {
    let matcher = match match_type {
        NameMatchType::Exact => StringMatcher::Exact(value.to_string()),
        NameMatchType::Insensitive => StringMatcher::Insensitive(insensitive(value)),
        NameMatchType::Normalised if author => {
            StringMatcher::NormalisedAuthor(normalise_author(value))
        }
        NameMatchType::Normalised => {
            let name = NameAnalyser::new()
                .analyse(None, value, None, None)
                .map(|a| a.key.scientific_name)
                .unwrap_or_else(|_| insensitive(value));
            StringMatcher::NormalisedName(name)
        }
        NameMatchType::Regex => {
            let pattern = RegexBuilder::new(&format!("^(?:{})$", value))
                .case_insensitive(true)
                .build()
                .map_err(|e| BackboneError::Config(format!("Bad condition regex {}: {}", value, e)))?;
            StringMatcher::Pattern(pattern)
        }
    };
    Ok(matcher)
}

impl StringMatcher {
    /// Compare against the raw value and the key value of a name or author
    fn matches(&self, raw: Option<&str>, key: Option<&str>) -> bool {
        match self {
            StringMatcher::Exact(value) => raw == Some(value.as_str()),
            StringMatcher::Insensitive(value) => raw.map(insensitive).as_deref() == Some(value.as_str()),
            StringMatcher::NormalisedName(value) => key == Some(value.as_str()),
            StringMatcher::NormalisedAuthor(value) => key == value.as_deref(),
            StringMatcher::Pattern(pattern) => raw.map(|r| pattern.is_match(&collapse_whitespace(r))).unwrap_or(false),
        }
    }
}

/// Add `adjustment` to the score when `condition` matches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreAdjustment {
    pub condition: TaxonCondition,
    pub adjustment: i32,
}

/// Forbidden conditions plus ordered score adjustments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreAdjuster {
    #[serde(default)]
    pub forbidden: Vec<TaxonCondition>,
    #[serde(default)]
    pub adjustments: Vec<ScoreAdjustment>,
}

impl ScoreAdjuster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forbid_when(mut self, condition: TaxonCondition) -> Self {
        self.forbidden.push(condition);
        self
    }

    pub fn adjust_when(mut self, condition: TaxonCondition, adjustment: i32) -> Self {
        self.adjustments.push(ScoreAdjustment {
            condition,
            adjustment,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.forbidden.is_empty() && self.adjustments.is_empty()
    }

    pub fn compile(&mut self) -> Result<()> {
        for condition in &mut self.forbidden {
            condition.compile()?;
        }
        for adjustment in &mut self.adjustments {
            adjustment.condition.compile()?;
        }
        Ok(())
    }

    /// Explanation of the first forbidding condition that matches
    pub fn forbid(&self, instance: &TaxonConceptInstance, key: &NameKey) -> Option<String> {
        self.forbidden
            .iter()
            .find(|c| c.matches(instance, key))
            .map(TaxonCondition::explain)
    }

    /// Fold matching adjustments onto a base score, in declaration order
    pub fn score(&self, base: i32, instance: &TaxonConceptInstance, key: &NameKey) -> i32 {
        self.adjustments.iter().fold(base, |score, adj| {
            if adj.condition.matches(instance, key) {
                score + adj.adjustment
            } else {
                score
            }
        })
    }
}

/// Conditional rewrite of name key components
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAdjustment {
    pub condition: TaxonCondition,
    #[serde(default)]
    pub nomenclatural_code: Option<NomenclaturalCode>,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub scientific_name_authorship: Option<String>,
    #[serde(default)]
    pub name_type: Option<NameType>,
    #[serde(default)]
    pub rank: Option<TaxonomicRank>,
}

impl KeyAdjustment {
    pub fn adjust(&self, key: NameKey, instance: &TaxonConceptInstance) -> NameKey {
        if !self.condition.matches(instance, &key) {
            return key;
        }
        let mut adjusted = key;
        if let Some(code) = self.nomenclatural_code {
            adjusted.code = Some(code);
        }
        if let Some(name) = &self.scientific_name {
            adjusted.scientific_name = insensitive(name);
        }
        if let Some(author) = &self.scientific_name_authorship {
            adjusted.authorship = normalise_author(author);
        }
        if let Some(name_type) = self.name_type {
            adjusted.name_type = name_type;
        }
        if let Some(rank) = self.rank {
            adjusted.rank = rank;
        }
        adjusted
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyAdjuster {
    #[serde(default)]
    pub adjustments: Vec<KeyAdjustment>,
}

impl KeyAdjuster {
    pub fn compile(&mut self) -> Result<()> {
        for adjustment in &mut self.adjustments {
            adjustment.condition.compile()?;
        }
        Ok(())
    }

    /// Apply every adjustment in order; each sees the result of the previous one
    pub fn adjust(&self, key: NameKey, instance: &TaxonConceptInstance) -> NameKey {
        self.adjustments
            .iter()
            .fold(key, |key, adjustment| adjustment.adjust(key, instance))
    }
}
