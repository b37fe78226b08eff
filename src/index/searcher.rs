//! Query resolution against a [`NameIndex`].
//!
//! A query goes through name derivation, an exact/canonical/phrase/fuzzy lookup, the
//! error checks (excluded, misapplied, split species, homonyms) and, when nothing
//! is found, relaxation up the supplied classification.

use crate::bio::names::normalise_author;
use crate::bio::{AnalysedName, NameAnalyser, NameMarker, NameType, TaxonomicRank};
use crate::core::config::MatchingConfig;
use crate::core::instance::Classification;
use crate::index::error_type::{ErrorType, MatchType};
use crate::index::metrics::{best_first, smith_waterman_gotoh, MatchMetrics, MatchTerms};
use crate::index::{EntryId, IndexEntry, NameIndex};
use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// Any subset of a classification supplied with a query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialClassification {
    pub scientific_name: Option<String>,
    #[serde(rename = "scientificNameAuthorship")]
    pub authorship: Option<String>,
    #[serde(rename = "taxonRank", deserialize_with = "rank_label")]
    pub rank: Option<TaxonomicRank>,
    pub kingdom: Option<String>,
    pub phylum: Option<String>,
    pub class: Option<String>,
    pub order: Option<String>,
    pub family: Option<String>,
    pub genus: Option<String>,
    pub specific_epithet: Option<String>,
    pub infraspecific_epithet: Option<String>,
}

fn rank_label<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<TaxonomicRank>, D::Error> {
    let label: Option<String> = Option::deserialize(deserializer)?;
    Ok(label.as_deref().and_then(TaxonomicRank::parse))
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl PartialClassification {
    pub fn from_name(name: &str, rank: Option<TaxonomicRank>) -> Self {
        Self {
            scientific_name: Some(name.to_string()),
            rank,
            ..Self::default()
        }
    }

    fn higher(&self, rank: TaxonomicRank) -> Option<&str> {
        match rank {
            TaxonomicRank::Kingdom => present(&self.kingdom),
            TaxonomicRank::Phylum => present(&self.phylum),
            TaxonomicRank::Class => present(&self.class),
            TaxonomicRank::Order => present(&self.order),
            TaxonomicRank::Family => present(&self.family),
            TaxonomicRank::Genus => present(&self.genus),
            _ => None,
        }
    }

    /// Genus and epithets joined, ignoring `sp`/`spp` placeholders
    fn binomial(&self) -> Option<String> {
        let genus = present(&self.genus)?;
        let specific = present(&self.specific_epithet).filter(|s| !is_placeholder(s))?;
        Some(match present(&self.infraspecific_epithet) {
            Some(infra) => format!("{} {} {}", genus, specific, infra),
            None => format!("{} {}", genus, specific),
        })
    }

    /// Fill in the name and rank from the classification, and strip a trailing `sp.`
    fn normalise(&mut self) {
        if present(&self.scientific_name).is_none() {
            let derived = self
                .binomial()
                .map(|name| {
                    let rank = if present(&self.infraspecific_epithet).is_some() {
                        TaxonomicRank::Subspecies
                    } else {
                        TaxonomicRank::Species
                    };
                    (name, rank)
                })
                .or_else(|| {
                    Classification::HIGHER_RANKS
                        .iter()
                        .find_map(|r| self.higher(*r).map(|n| (n.to_string(), *r)))
                });
            if let Some((name, rank)) = derived {
                self.scientific_name = Some(name);
                self.rank = self.rank.or(Some(rank));
            }
        }

        if let Some(name) = present(&self.scientific_name).map(str::to_string) {
            let stripped = name
                .strip_suffix(" sp.")
                .or_else(|| name.strip_suffix(" sp"))
                .map(str::trim_end);
            if let Some(stripped) = stripped {
                self.scientific_name = Some(stripped.to_string());
                if self.rank.map_or(true, |r| r == TaxonomicRank::Species) {
                    self.rank = None;
                }
            }
        }

        if self.rank.is_none() {
            let name = present(&self.scientific_name);
            self.rank = Classification::HIGHER_RANKS
                .iter()
                .find(|r| name.is_some() && self.higher(**r) == name)
                .copied();
        }
    }

    fn has_context(&self) -> bool {
        Classification::HIGHER_RANKS
            .iter()
            .any(|r| self.higher(*r).is_some())
    }

    fn classification(&self) -> Classification {
        Classification {
            kingdom: self.kingdom.clone(),
            phylum: self.phylum.clone(),
            class: self.class.clone(),
            order: self.order.clone(),
            family: self.family.clone(),
            genus: self.genus.clone(),
            specific_epithet: self.specific_epithet.clone(),
            infraspecific_epithet: self.infraspecific_epithet.clone(),
        }
    }

    pub fn terms(&self) -> MatchTerms<'_> {
        MatchTerms {
            kingdom: present(&self.kingdom),
            phylum: present(&self.phylum),
            class: present(&self.class),
            order: present(&self.order),
            family: present(&self.family),
            genus: present(&self.genus),
            specific_epithet: present(&self.specific_epithet),
            infraspecific_epithet: present(&self.infraspecific_epithet),
            authorship: present(&self.authorship),
            rank: self.rank,
        }
    }
}

fn is_placeholder(epithet: &str) -> bool {
    matches!(
        epithet.trim_end_matches('.').to_lowercase().as_str(),
        "sp" | "spp" | "ssp"
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub entry: IndexEntry,
    /// Accepted taxon when the entry is a synonym
    pub accepted: Option<IndexEntry>,
    pub metrics: MatchMetrics,
}

impl Candidate {
    /// The taxon the match stands for
    pub fn taxon(&self) -> &IndexEntry {
        self.accepted.as_ref().unwrap_or(&self.entry)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "candidates", rename_all = "camelCase")]
pub enum MatchOutcome {
    Unique(Candidate),
    /// Unresolved homonyms, best first
    Ambiguous(Vec<Candidate>),
    NotFound,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub outcome: MatchOutcome,
    pub errors: BTreeSet<ErrorType>,
    pub match_type: Option<MatchType>,
    pub cleaned_name: Option<String>,
    pub name_type: Option<NameType>,
}

impl MatchResult {
    fn not_found() -> Self {
        Self {
            outcome: MatchOutcome::NotFound,
            errors: BTreeSet::new(),
            match_type: None,
            cleaned_name: None,
            name_type: None,
        }
    }

    pub fn unique(candidate: Candidate, match_type: MatchType) -> Self {
        Self {
            outcome: MatchOutcome::Unique(candidate),
            errors: BTreeSet::from([ErrorType::None]),
            match_type: Some(match_type),
            ..Self::not_found()
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self.outcome, MatchOutcome::Unique(_))
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self.outcome, MatchOutcome::Ambiguous(_))
    }

    /// The unique match, or the best ranked homonym
    pub fn best(&self) -> Option<&Candidate> {
        match &self.outcome {
            MatchOutcome::Unique(candidate) => Some(candidate),
            MatchOutcome::Ambiguous(candidates) => candidates.first(),
            MatchOutcome::NotFound => None,
        }
    }

    pub fn has_error(&self, error: ErrorType) -> bool {
        self.errors.contains(&error)
    }

    pub fn outcome_label(&self) -> &'static str {
        match self.outcome {
            MatchOutcome::Unique(_) => "unique",
            MatchOutcome::Ambiguous(_) => "ambiguous",
            MatchOutcome::NotFound => "notFound",
        }
    }
}

/// Hits for one name, before the error checks
struct Hits {
    ids: Vec<EntryId>,
    match_type: MatchType,
}

/// Outcome of searching one name
enum Found {
    Unique(EntryId, MatchType),
    Ambiguous(Vec<EntryId>, MatchType),
    Nothing,
}

/// Read-only query front end over a finalized index
#[derive(Debug)]
pub struct Searcher {
    index: NameIndex,
    config: MatchingConfig,
    analyser: NameAnalyser,
}

impl Searcher {
    pub fn new(index: NameIndex, config: MatchingConfig) -> Self {
        Self {
            index,
            config,
            analyser: NameAnalyser::new(),
        }
    }

    pub fn index(&self) -> &NameIndex {
        &self.index
    }

    /// Search for a name alone, without relaxing to higher ranks
    pub fn search_by_name(&self, name: &str, rank: Option<TaxonomicRank>) -> MatchResult {
        self.search(PartialClassification::from_name(name, rank), false)
    }

    pub fn search_by_classification(&self, query: &PartialClassification) -> MatchResult {
        self.search(query.clone(), true)
    }

    /// Direct lookup, following variant and duplicate identifiers
    pub fn search_by_id(&self, taxon_id: &str) -> Option<Candidate> {
        let id = self.index.lookup_id(taxon_id)?;
        let entry = self.index.entry(id);
        Some(Candidate {
            entry: entry.clone(),
            accepted: self.index.accepted_of(entry).cloned(),
            metrics: MatchMetrics {
                priority: entry.priority,
                ..MatchMetrics::default()
            },
        })
    }

    pub fn search_batch(&self, queries: &[PartialClassification]) -> Vec<MatchResult> {
        queries
            .par_iter()
            .map(|q| self.search_by_classification(q))
            .collect()
    }

    fn search(&self, mut query: PartialClassification, recursive: bool) -> MatchResult {
        query.normalise();
        let mut result = MatchResult::not_found();
        let Some(raw) = present(&query.scientific_name).map(str::to_string) else {
            result.errors.insert(ErrorType::Generic);
            return result;
        };

        let mut errors = BTreeSet::new();
        let mut name = raw.clone();
        if name.contains('?') {
            errors.insert(ErrorType::QuestionSpecies);
            name = name.replace('?', " ").trim().to_string();
        }

        let analysed = match self.analyser.analyse(None, &name, query.authorship.as_deref(), query.rank) {
            Ok(analysed) => Some(analysed),
            Err(err) => {
                tracing::debug!("Searching {} unanalysed: {}", name, err);
                errors.insert(ErrorType::Generic);
                None
            }
        };
        if let Some(analysed) = &analysed {
            result.cleaned_name = Some(analysed.canonical());
            result.name_type = Some(analysed.key.name_type);
            for (marker, error) in [
                (NameMarker::Affinity, ErrorType::AffinitySpecies),
                (NameMarker::Confer, ErrorType::ConferSpecies),
                (NameMarker::SpeciesPlural, ErrorType::SpeciesPlural),
            ] {
                if analysed.has_marker(marker) {
                    errors.insert(error);
                }
            }
            if query.genus.is_none() {
                query.genus = analysed
                    .genus
                    .clone()
                    .filter(|_| analysed.specific_epithet.is_some());
            }
        }
        let rank = query
            .rank
            .or_else(|| analysed.as_ref().and_then(AnalysedName::implied_rank));

        let mut found = self.find(&query, &name, analysed.as_ref(), rank, &mut errors);

        // Indeterminate and plural names stand for their genus
        if let (true, Some(analysed)) = (matches!(found, Found::Nothing), &analysed) {
            let generic = analysed.key.name_type == NameType::Doubtful
                || analysed.has_marker(NameMarker::SpeciesPlural);
            if generic {
                if analysed.has_marker(NameMarker::Indeterminate) {
                    errors.insert(ErrorType::IndeterminateSpecies);
                }
                if let Some(genus) = analysed.genus.as_deref() {
                    found = self.find_name(&query, genus, Some(TaxonomicRank::Genus), &mut errors);
                }
            }
        }

        let mut homonyms = None;
        if recursive {
            if matches!(found, Found::Ambiguous(..)) {
                homonyms = Some(std::mem::replace(&mut found, Found::Nothing));
            }
            if matches!(found, Found::Nothing) {
                found = self.relax(&query, &name, rank, &mut errors);
                if let Found::Unique(id, _) = found {
                    found = Found::Unique(id, MatchType::Recursive);
                }
            }
            if let (true, Some(homonyms)) = (matches!(found, Found::Nothing), homonyms) {
                found = homonyms;
            }
        }

        let terms = query.terms();
        match found {
            Found::Unique(id, match_type) => {
                result.outcome = MatchOutcome::Unique(self.candidate(id, &terms));
                result.match_type = Some(match_type);
            }
            Found::Ambiguous(ids, match_type) => {
                let candidates: Vec<Candidate> = ids.into_iter().map(|id| self.candidate(id, &terms)).collect();
                result.outcome = MatchOutcome::Ambiguous(best_first(candidates, |c: &Candidate| c.metrics));
                result.match_type = Some(match_type);
                errors.insert(ErrorType::Homonym);
            }
            Found::Nothing => {}
        }

        if errors.is_empty() {
            errors.insert(ErrorType::None);
        }
        result.errors = errors;
        tracing::debug!(
            "Searched {}: {:?} {:?}",
            raw,
            result.match_type,
            result.errors
        );
        result
    }

    /// Walk up the supplied classification until something is found
    fn relax(
        &self,
        query: &PartialClassification,
        name: &str,
        rank: Option<TaxonomicRank>,
        errors: &mut BTreeSet<ErrorType>,
    ) -> Found {
        let mut levels: Vec<(String, TaxonomicRank)> = Vec::new();
        if rank.is_some_and(|r| r.is_infraspecific()) {
            if let (Some(genus), Some(specific)) = (present(&query.genus), present(&query.specific_epithet)) {
                levels.push((format!("{} {}", genus, specific), TaxonomicRank::Species));
            }
        }
        for level in Classification::HIGHER_RANKS {
            if rank.is_some_and(|r| !level.is_higher_than(r)) {
                continue;
            }
            if let Some(value) = query.higher(level).filter(|v| !v.eq_ignore_ascii_case(name)) {
                levels.push((value.to_string(), level));
            }
        }

        for (name, level) in levels.into_iter().take(self.config.max_relaxation_depth) {
            let mut relaxed = query.clone();
            relaxed.rank = Some(level);
            match self.find_name(&relaxed, &name, Some(level), errors) {
                Found::Nothing => continue,
                found => return found,
            }
        }
        Found::Nothing
    }

    fn find_name(
        &self,
        query: &PartialClassification,
        name: &str,
        rank: Option<TaxonomicRank>,
        errors: &mut BTreeSet<ErrorType>,
    ) -> Found {
        let analysed = self.analyser.analyse(None, name, None, rank).ok();
        self.find(query, name, analysed.as_ref(), rank, errors)
    }

    fn find(
        &self,
        query: &PartialClassification,
        name: &str,
        analysed: Option<&AnalysedName>,
        rank: Option<TaxonomicRank>,
        errors: &mut BTreeSet<ErrorType>,
    ) -> Found {
        match self.lookup(name, analysed, rank) {
            Some(hits) => self.check(query, hits, rank, errors),
            None => Found::Nothing,
        }
    }

    /// Exact, canonical, phrase and fuzzy lookups, first non-empty wins
    fn lookup(&self, name: &str, analysed: Option<&AnalysedName>, rank: Option<TaxonomicRank>) -> Option<Hits> {
        let filter = |ids: &[EntryId]| -> Vec<EntryId> {
            ids.iter()
                .copied()
                .filter(|id| rank_compatible(self.index.entry(*id), rank))
                .collect()
        };
        let hits = |ids: Vec<EntryId>, match_type| (!ids.is_empty()).then_some(Hits { ids, match_type });

        if let Some(found) = hits(filter(self.index.exact(name)), MatchType::Exact) {
            return Some(found);
        }
        let analysed = analysed?;
        if analysed.key.is_formal() {
            if let Some(found) = hits(filter(self.index.canonical(&analysed.key)), MatchType::Canonical) {
                return Some(found);
            }
        }
        if analysed.has_marker(NameMarker::Phrase) {
            if let Some(found) = hits(filter(self.index.phrase(analysed)), MatchType::Phrase) {
                return Some(found);
            }
        }
        if self.config.fuzzy && analysed.key.is_formal() && analysed.is_binomial() {
            return hits(filter(&self.fuzzy(analysed)), MatchType::Fuzzy);
        }
        None
    }

    /// Closest binomials in the same genus within the edit and length bounds
    fn fuzzy(&self, analysed: &AnalysedName) -> Vec<EntryId> {
        let Some(genus) = analysed.genus.as_deref() else {
            return Vec::new();
        };
        let target = &analysed.key.scientific_name;
        let mut best = Vec::new();
        let mut best_distance = usize::MAX;
        for id in self.index.in_genus(genus) {
            let candidate = &self.index.entry(*id).name.key.scientific_name;
            if candidate.len().abs_diff(target.len()) > self.config.max_length_difference {
                continue;
            }
            let distance = strsim::levenshtein(candidate, target);
            if distance > self.config.max_edit_distance || distance > best_distance {
                continue;
            }
            if distance < best_distance {
                best.clear();
                best_distance = distance;
            }
            best.push(*id);
        }
        best
    }

    /// Error checks and homonym resolution over the hits for one name
    fn check(
        &self,
        query: &PartialClassification,
        hits: Hits,
        rank: Option<TaxonomicRank>,
        errors: &mut BTreeSet<ErrorType>,
    ) -> Found {
        let match_type = hits.match_type;
        let mut ids = hits.ids;
        let entry = |id: &EntryId| self.index.entry(*id);

        let excluded = ids.iter().filter(|id| entry(id).is_excluded()).count();
        if excluded == ids.len() {
            errors.insert(ErrorType::Excluded);
        } else if excluded > 0 {
            errors.insert(ErrorType::AssociatedExcluded);
            ids.retain(|id| !entry(id).is_excluded());
        }

        let misapplied = ids.iter().filter(|id| entry(id).is_misapplied()).count();
        if misapplied == ids.len() {
            errors.insert(ErrorType::Misapplied);
        } else if misapplied > 0 {
            errors.insert(ErrorType::MatchMisapplied);
            ids.retain(|id| !entry(id).is_misapplied());
        }

        if ids.len() == 1 {
            return Found::Unique(ids[0], match_type);
        }

        if let Some(child) = self.species_split(&ids) {
            errors.insert(ErrorType::ParentChildSynonym);
            return Found::Unique(child, match_type);
        }

        if let Some(author) = present(&query.authorship).and_then(normalise_author) {
            let authored: Vec<EntryId> = ids
                .iter()
                .copied()
                .filter(|id| {
                    entry(id)
                        .authorship
                        .as_deref()
                        .and_then(normalise_author)
                        .is_some_and(|a| {
                            smith_waterman_gotoh(&a.to_uppercase(), &author.to_uppercase())
                                >= self.config.author_similarity
                        })
                })
                .collect();
            if !authored.is_empty() {
                ids = authored;
            }
        }

        if query.has_context() {
            let supplied = query.classification();
            let level = rank
                .filter(|r| !r.is_unranked())
                .unwrap_or(TaxonomicRank::Species);
            let agreeing: Vec<EntryId> = ids
                .iter()
                .copied()
                .filter(|id| {
                    let entry = entry(id);
                    supplied.agrees_with(&entry.classification, TaxonomicRank::Genus)
                        && (level.is_higher_than(TaxonomicRank::Genus)
                            || self.classification_known(entry, &supplied))
                })
                .collect();
            if !agreeing.is_empty() {
                ids = agreeing;
            }
        }

        // Hits that are one taxon under different names are not homonyms
        let mut taxa: Vec<&str> = ids
            .iter()
            .map(|id| {
                let entry = entry(id);
                entry.accepted_id.as_deref().unwrap_or(entry.taxon_id.as_str())
            })
            .collect();
        taxa.sort_unstable();
        taxa.dedup();
        if taxa.len() == 1 {
            let chosen = ids
                .iter()
                .copied()
                .find(|id| !entry(id).is_synonym())
                .unwrap_or(ids[0]);
            return Found::Unique(chosen, match_type);
        }

        Found::Ambiguous(ids, match_type)
    }

    /// The supplied classification carries at least one rank the entry also has
    fn classification_known(&self, entry: &IndexEntry, supplied: &Classification) -> bool {
        Classification::HIGHER_RANKS
            .iter()
            .any(|r| supplied.get(*r).is_some() && entry.classification.get(*r).is_some())
    }

    /// One accepted hit and one synonym of a taxon inside the accepted hit's subtree:
    /// a split species whose old name lives on as a synonym of the child
    fn species_split(&self, ids: &[EntryId]) -> Option<EntryId> {
        let [a, b] = ids else {
            return None;
        };
        let (first, second) = (self.index.entry(*a), self.index.entry(*b));
        let (synonym, accepted) = match (first.is_synonym(), second.is_synonym()) {
            (true, false) => (*a, second),
            (false, true) => (*b, first),
            _ => return None,
        };
        let child = self.index.accepted_of(self.index.entry(synonym))?;
        accepted.contains(child).then_some(synonym)
    }

    fn candidate(&self, id: EntryId, query: &MatchTerms) -> Candidate {
        let entry = self.index.entry(id);
        Candidate {
            entry: entry.clone(),
            accepted: self.index.accepted_of(entry).cloned(),
            metrics: MatchMetrics::compute(query, &entry.terms(), entry.is_synonym(), entry.priority),
        }
    }
}

/// Species-and-below queries take any lower or unranked entry; others need the same rank.
/// Synonyms always pass.
fn rank_compatible(entry: &IndexEntry, rank: Option<TaxonomicRank>) -> bool {
    let Some(rank) = rank.filter(|r| !r.is_unranked()) else {
        return true;
    };
    if entry.is_synonym() || entry.rank.is_unranked() {
        return true;
    }
    if rank.id() >= TaxonomicRank::Species.id() {
        entry.rank.id() >= TaxonomicRank::Species.id()
    } else {
        entry.rank == rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::provider::ProviderRegistry;
    use crate::index::tests::sample_taxonomy;
    use crate::taxonomy::{Source, Taxonomy};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn searcher() -> Searcher {
        let index = NameIndex::from_taxonomy(&sample_taxonomy()).unwrap();
        Searcher::new(index, MatchingConfig::default())
    }

    fn taxon_id(result: &MatchResult) -> Option<&str> {
        result.best().map(|c| c.entry.taxon_id.as_str())
    }

    #[test]
    fn test_exact_name() {
        let result = searcher().search_by_name("Acacia dealbata", None);
        assert!(result.is_found());
        assert_eq!(taxon_id(&result), Some("S1"));
        assert_eq!(result.match_type, Some(MatchType::Exact));
        assert_eq!(result.errors, BTreeSet::from([ErrorType::None]));
    }

    #[test]
    fn test_canonical_name_with_author() {
        let result = searcher().search_by_name("Acacia dealbata Link", None);
        assert_eq!(taxon_id(&result), Some("S1"));
        assert_eq!(result.match_type, Some(MatchType::Canonical));
    }

    #[test]
    fn test_synonym_returns_accepted() {
        let result = searcher().search_by_name("Racosperma dealbatum", Some(TaxonomicRank::Species));
        let candidate = result.best().unwrap();
        assert_eq!(candidate.entry.taxon_id, "Y1");
        assert_eq!(candidate.taxon().taxon_id, "S1");
    }

    #[test]
    fn test_fuzzy_name() {
        let result = searcher().search_by_name("Acacia dealbatta", None);
        assert_eq!(taxon_id(&result), Some("S1"));
        assert_eq!(result.match_type, Some(MatchType::Fuzzy));

        let strict = Searcher::new(
            NameIndex::from_taxonomy(&sample_taxonomy()).unwrap(),
            MatchingConfig {
                fuzzy: false,
                ..MatchingConfig::default()
            },
        );
        assert!(!strict.search_by_name("Acacia dealbatta", None).is_found());
    }

    #[test]
    fn test_phrase_name() {
        let result = searcher().search_by_name("Acacia sp. Bungonia (D. Smith 123)", None);
        assert_eq!(taxon_id(&result), Some("S2"));
    }

    #[test]
    fn test_homonym_without_context() {
        let query = PartialClassification {
            genus: Some("Simsia".to_string()),
            ..PartialClassification::default()
        };
        let result = searcher().search_by_classification(&query);
        assert!(result.is_ambiguous());
        assert!(result.has_error(ErrorType::Homonym));
        match &result.outcome {
            MatchOutcome::Ambiguous(candidates) => assert_eq!(candidates.len(), 2),
            other => panic!("expected homonyms, got {:?}", other),
        }
    }

    #[rstest]
    #[case("Plantae", "G1")]
    #[case("Animalia", "G2")]
    fn test_homonym_resolved_by_kingdom(#[case] kingdom: &str, #[case] expected: &str) {
        let query = PartialClassification {
            kingdom: Some(kingdom.to_string()),
            genus: Some("Simsia".to_string()),
            ..PartialClassification::default()
        };
        let result = searcher().search_by_classification(&query);
        assert!(result.is_found());
        assert_eq!(taxon_id(&result), Some(expected));
        assert!(!result.has_error(ErrorType::Homonym));
    }

    #[test]
    fn test_homonym_resolved_by_author() {
        let result = searcher().search_by_classification(&PartialClassification {
            scientific_name: Some("Simsia".to_string()),
            authorship: Some("Champion".to_string()),
            ..PartialClassification::default()
        });
        assert_eq!(taxon_id(&result), Some("G2"));
    }

    #[test]
    fn test_affinity_matches_genus() {
        let query = PartialClassification::from_name("Thelymitra aff. pauciflora", None);
        let result = searcher().search_by_classification(&query);
        assert!(result.has_error(ErrorType::AffinitySpecies));
        assert_eq!(taxon_id(&result), Some("G4"));
        assert_eq!(result.match_type, Some(MatchType::Recursive));
        assert_eq!(result.name_type, Some(NameType::Informal));
    }

    #[test]
    fn test_question_mark_is_stripped() {
        let result = searcher().search_by_name("Acacia dealbata?", None);
        assert_eq!(taxon_id(&result), Some("S1"));
        assert!(result.has_error(ErrorType::QuestionSpecies));
    }

    #[test]
    fn test_species_plural_matches_genus() {
        let result = searcher().search_by_name("Acacia spp.", None);
        assert_eq!(taxon_id(&result), Some("G3"));
        assert!(result.has_error(ErrorType::SpeciesPlural));
    }

    #[test]
    fn test_indeterminate_matches_genus() {
        let result = searcher().search_by_name("Acacia indet.", None);
        assert_eq!(taxon_id(&result), Some("G3"));
        assert!(result.has_error(ErrorType::IndeterminateSpecies));
    }

    #[test]
    fn test_trailing_sp_is_genus() {
        let result = searcher().search_by_name("Acacia sp.", None);
        assert_eq!(taxon_id(&result), Some("G3"));
    }

    #[test]
    fn test_relaxes_to_family() {
        let query = PartialClassification {
            scientific_name: Some("Unknownia mystica".to_string()),
            family: Some("Fabaceae".to_string()),
            kingdom: Some("Plantae".to_string()),
            ..PartialClassification::default()
        };
        let result = searcher().search_by_classification(&query);
        assert_eq!(taxon_id(&result), Some("F2"));
        assert_eq!(result.match_type, Some(MatchType::Recursive));

        let result = searcher().search_by_name("Unknownia mystica", None);
        assert_eq!(result.outcome_label(), "notFound");
    }

    #[test]
    fn test_relaxation_depth_bound() {
        let index = NameIndex::from_taxonomy(&sample_taxonomy()).unwrap();
        let searcher = Searcher::new(
            index,
            MatchingConfig {
                max_relaxation_depth: 1,
                ..MatchingConfig::default()
            },
        );
        let query = PartialClassification {
            scientific_name: Some("Unknownia mystica".to_string()),
            genus: Some("Unknownia".to_string()),
            kingdom: Some("Plantae".to_string()),
            ..PartialClassification::default()
        };
        assert!(!searcher.search_by_classification(&query).is_found());
    }

    #[test]
    fn test_search_by_id() {
        let searcher = searcher();
        let candidate = searcher.search_by_id("Y1").unwrap();
        assert_eq!(candidate.taxon().taxon_id, "S1");
        assert!(searcher.search_by_id("missing").is_none());
    }

    #[test]
    fn test_batch() {
        let queries = vec![
            PartialClassification::from_name("Acacia dealbata", None),
            PartialClassification::from_name("Nothing here", None),
        ];
        let results = searcher().search_batch(&queries);
        assert!(results[0].is_found());
        assert!(!results[1].is_found());
    }

    fn special_searcher() -> Searcher {
        const HEADER: &str = "taxonID,scientificName,scientificNameAuthorship,taxonomicStatus,taxonRank,parentNameUsageID,acceptedNameUsageID,nomenclaturalCode";
        let rows = [
            "G,Eucalyptus,L'Her.,accepted,genus,,,ICN",
            "S1,Eucalyptus obliqua,L'Her.,accepted,species,G,,ICN",
            "S2,Eucalyptus alba,Reinw.,accepted,species,G,,ICN",
            "M1,Eucalyptus alba,auct.,misapplied,species,,S1,ICN",
            "S3,Eucalyptus regnans,F.Muell.,accepted,species,G,,ICN",
            "X1,Eucalyptus regnans,Blakely,excluded,species,G,,ICN",
            "S4,Eucalyptus viminalis,Labill.,accepted,species,G,,ICN",
            "S5,Eucalyptus viminalis subsp. viminalis,,accepted,subspecies,S4,,ICN",
            "Y5,Eucalyptus viminalis,Sm.,synonym,species,,S5,ICN",
            "X2,Eucalyptus nowhere,,excluded,species,G,,ICN",
        ];
        let data = format!("{}\n{}\n", HEADER, rows.join("\n"));
        let providers = ProviderRegistry::from_json(r#"[{"id": "apc"}]"#).unwrap();
        let mut config = Config::default();
        config.performance.progress = false;
        let mut taxonomy = Taxonomy::new(config, providers);
        taxonomy
            .load(&[Source::from_reader("apc", "special.csv", data.as_bytes(), b',').unwrap()])
            .unwrap();
        taxonomy.resolve().unwrap();
        Searcher::new(NameIndex::from_taxonomy(&taxonomy).unwrap(), MatchingConfig::default())
    }

    #[test]
    fn test_match_misapplied() {
        let result = special_searcher().search_by_name("Eucalyptus alba", None);
        assert_eq!(taxon_id(&result), Some("S2"));
        assert!(result.has_error(ErrorType::MatchMisapplied));
    }

    #[test]
    fn test_associated_excluded() {
        let result = special_searcher().search_by_name("Eucalyptus regnans", None);
        assert_eq!(taxon_id(&result), Some("S3"));
        assert!(result.has_error(ErrorType::AssociatedExcluded));
    }

    #[test]
    fn test_excluded() {
        let result = special_searcher().search_by_name("Eucalyptus nowhere", None);
        assert_eq!(taxon_id(&result), Some("X2"));
        assert!(result.has_error(ErrorType::Excluded));
    }

    #[test]
    fn test_parent_child_synonym() {
        let result = special_searcher().search_by_name("Eucalyptus viminalis", Some(TaxonomicRank::Species));
        let candidate = result.best().unwrap();
        assert!(result.has_error(ErrorType::ParentChildSynonym));
        assert_eq!(candidate.entry.taxon_id, "Y5");
        assert_eq!(candidate.taxon().taxon_id, "S5");
    }

    #[test]
    fn test_query_deserialises_rank_labels() {
        let query: PartialClassification =
            serde_json::from_str(r#"{"scientificName": "Acacia", "taxonRank": "Genus"}"#).unwrap();
        assert_eq!(query.rank, Some(TaxonomicRank::Genus));
    }
}
