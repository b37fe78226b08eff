//! Data providers and their scoring configuration.
//!
//! Providers are declared in a JSON array. Declaration order matters: it is the
//! deterministic tie-break whenever two instances score the same.

use crate::bio::names::insensitive;
use crate::bio::{NameKey, NomenclaturalCode, TaxonomicStatus};
use crate::core::instance::TaxonConceptInstance;
use crate::core::rules::{KeyAdjuster, ScoreAdjuster, ScoreAdjustment, TaxonCondition};
use crate::{BackboneError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

pub const DEFAULT_SCORE: i32 = 100;
pub const MIN_SCORE: i32 = 0;
pub const MAX_SCORE: i32 = 1000;

/// Which unranked instances may be moved into a ranked concept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnrankedStrategy {
    AllInfer,
    All,
    InferredAndSynonymsInfer,
    InferredAndSynonyms,
    SynonymsInfer,
    Synonyms,
    #[default]
    None,
}

impl UnrankedStrategy {
    /// May a rank be inferred when no ranked name exists
    pub fn infer_rank(&self) -> bool {
        matches!(
            self,
            Self::AllInfer | Self::InferredAndSynonymsInfer | Self::SynonymsInfer
        )
    }

    pub fn reassigns(&self, status: TaxonomicStatus) -> bool {
        use TaxonomicStatus::*;
        let synonym = matches!(
            status,
            HomotypicSynonym
                | InferredSynonym
                | Synonym
                | HeterotypicSynonym
                | ObjectiveSynonym
                | ProParteSynonym
                | SubjectiveSynonym
        );
        match self {
            Self::AllInfer | Self::All => true,
            Self::InferredAndSynonymsInfer | Self::InferredAndSynonyms => {
                synonym || matches!(status, InferredUnplaced | InferredAccepted)
            }
            Self::SynonymsInfer | Self::Synonyms => synonym,
            Self::None => false,
        }
    }
}

/// What happens to instances that end up with no eligible representative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscardStrategy {
    /// Kept as variant rows only
    #[default]
    Ignore,
    /// Identifier maps to the parent's representative
    IdentifierTranslation,
    /// Emitted as a synonym of the parent's representative
    SynonymTranslation,
}

/// Provider record as written in the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub default_score: Option<i32>,
    #[serde(default)]
    pub specific_scores: Option<HashMap<String, i32>>,
    #[serde(default)]
    pub owner: Option<Vec<String>>,
    #[serde(default)]
    pub unranked_strategy: Option<UnrankedStrategy>,
    #[serde(default)]
    pub discard_strategy: Option<DiscardStrategy>,
    #[serde(default)]
    pub forbidden: Option<Vec<TaxonCondition>>,
    #[serde(default)]
    pub adjustments: Option<Vec<ScoreAdjustment>>,
    #[serde(default)]
    pub key_adjuster: Option<KeyAdjuster>,
    #[serde(default)]
    pub default_nomenclatural_code: Option<NomenclaturalCode>,
    #[serde(default)]
    pub default_parent_taxon: Option<String>,
    #[serde(default)]
    pub scientific_name_changes: Option<HashMap<String, String>>,
    #[serde(default)]
    pub scientific_name_authorship_changes: Option<HashMap<String, String>>,
    #[serde(default)]
    pub loose: Option<bool>,
}

/// A data source with its inherited settings resolved
#[derive(Debug, Clone)]
pub struct NameProvider {
    pub id: String,
    /// Declaration order
    pub index: usize,
    pub name: Option<String>,
    pub default_score: i32,
    specific_scores: HashMap<String, i32>,
    owner: BTreeSet<String>,
    pub unranked_strategy: UnrankedStrategy,
    pub discard_strategy: DiscardStrategy,
    pub adjuster: ScoreAdjuster,
    pub key_adjuster: KeyAdjuster,
    pub default_code: Option<NomenclaturalCode>,
    pub default_parent_taxon: Option<String>,
    scientific_name_changes: HashMap<String, String>,
    authorship_changes: HashMap<String, String>,
    pub loose: bool,
}

impl NameProvider {
    /// A provider with defaults everywhere
    pub fn new(id: impl Into<String>, index: usize) -> Self {
        Self {
            id: id.into(),
            index,
            name: None,
            default_score: DEFAULT_SCORE,
            specific_scores: HashMap::new(),
            owner: BTreeSet::new(),
            unranked_strategy: UnrankedStrategy::default(),
            discard_strategy: DiscardStrategy::default(),
            adjuster: ScoreAdjuster::default(),
            key_adjuster: KeyAdjuster::default(),
            default_code: None,
            default_parent_taxon: None,
            scientific_name_changes: HashMap::new(),
            authorship_changes: HashMap::new(),
            loose: false,
        }
    }

    pub fn with_default_score(mut self, score: i32) -> Self {
        self.default_score = score;
        self
    }

    pub fn with_specific_score(mut self, name: &str, score: i32) -> Self {
        self.specific_scores.insert(insensitive(name), score);
        self
    }

    pub fn with_adjuster(mut self, adjuster: ScoreAdjuster) -> Self {
        self.adjuster = adjuster;
        self
    }

    pub fn with_unranked_strategy(mut self, strategy: UnrankedStrategy) -> Self {
        self.unranked_strategy = strategy;
        self
    }

    pub fn with_owner(mut self, name: &str) -> Self {
        self.owner.insert(insensitive(name));
        self
    }

    pub fn with_default_code(mut self, code: NomenclaturalCode) -> Self {
        self.default_code = Some(code);
        self
    }

    /// Score override for the instance's name, or for its genus
    pub fn specific_score(&self, instance: &TaxonConceptInstance) -> Option<i32> {
        if self.specific_scores.is_empty() {
            return None;
        }
        let name = insensitive(&instance.scientific_name);
        self.specific_scores.get(&name).copied().or_else(|| {
            instance
                .key
                .scientific_name
                .split_whitespace()
                .next()
                .filter(|genus| *genus != instance.key.scientific_name)
                .and_then(|genus| self.specific_scores.get(genus).copied())
        })
    }

    pub fn owns(&self, instance: &TaxonConceptInstance) -> bool {
        !self.owner.is_empty() && self.owner.contains(&insensitive(&instance.scientific_name))
    }

    /// Final score and forbid explanation for an instance with the given base score
    pub fn score(&self, base: i32, instance: &TaxonConceptInstance) -> (i32, Option<String>) {
        if self.owns(instance) {
            return (MAX_SCORE, None);
        }
        if let Some(reason) = self.adjuster.forbid(instance, &instance.key) {
            return (MIN_SCORE, Some(reason));
        }
        let score = self.adjuster.score(base, instance, &instance.key);
        (score.clamp(MIN_SCORE, MAX_SCORE), None)
    }

    pub fn adjust_key(&self, key: NameKey, instance: &TaxonConceptInstance) -> NameKey {
        self.key_adjuster
            .adjust(key, instance)
            .with_default_code(self.default_code)
    }

    /// Apply configured corrections to a raw scientific name
    pub fn correct_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.scientific_name_changes
            .get(name)
            .map(String::as_str)
            .unwrap_or(name)
    }

    pub fn correct_authorship<'a>(&'a self, author: &'a str) -> &'a str {
        self.authorship_changes
            .get(author)
            .map(String::as_str)
            .unwrap_or(author)
    }
}

/// Providers in declaration order
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: IndexMap<String, NameProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider; its index becomes its declaration position
    pub fn add(&mut self, mut provider: NameProvider) -> Result<usize> {
        if self.providers.contains_key(&provider.id) {
            return Err(BackboneError::Config(format!(
                "Duplicate provider id {}",
                provider.id
            )));
        }
        provider.index = self.providers.len();
        let index = provider.index;
        self.providers.insert(provider.id.clone(), provider);
        Ok(index)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let configs: Vec<ProviderConfig> = serde_json::from_str(json)
            .map_err(|e| BackboneError::Config(format!("Failed to parse providers: {}", e)))?;
        Self::from_configs(configs)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_configs(configs: Vec<ProviderConfig>) -> Result<Self> {
        let by_id: HashMap<&str, &ProviderConfig> =
            configs.iter().map(|c| (c.id.as_str(), c)).collect();
        let mut registry = Self::new();
        for config in &configs {
            if config.id.trim().is_empty() {
                return Err(BackboneError::Config("Provider with empty id".to_string()));
            }
            let chain = inheritance_chain(config, &by_id)?;
            let provider = resolve_provider(&chain, registry.len())?;
            registry.add(provider)?;
        }
        tracing::debug!("Loaded {} providers", registry.len());
        Ok(registry)
    }

    /// Index of the provider, adding a default one when missing
    pub fn ensure(&mut self, id: &str) -> usize {
        if let Some(index) = self.providers.get_index_of(id) {
            return index;
        }
        let index = self.providers.len();
        self.providers
            .insert(id.to_string(), NameProvider::new(id, index));
        index
    }

    pub fn get(&self, index: usize) -> Option<&NameProvider> {
        self.providers.get_index(index).map(|(_, p)| p)
    }

    pub fn by_id(&self, id: &str) -> Option<&NameProvider> {
        self.providers.get(id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.providers.get_index_of(id)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NameProvider> {
        self.providers.values()
    }
}

/// The provider followed by its ancestors, nearest first
fn inheritance_chain<'a>(
    config: &'a ProviderConfig,
    by_id: &HashMap<&str, &'a ProviderConfig>,
) -> Result<Vec<&'a ProviderConfig>> {
    let mut chain = vec![config];
    let mut current = config;
    while let Some(parent_id) = &current.parent {
        let parent = by_id.get(parent_id.as_str()).copied().ok_or_else(|| {
            BackboneError::Config(format!(
                "Provider {} has unknown parent {}",
                current.id, parent_id
            ))
        })?;
        if chain.iter().any(|c| c.id == parent.id) {
            return Err(BackboneError::Config(format!(
                "Provider inheritance loop at {}",
                parent.id
            )));
        }
        chain.push(parent);
        current = parent;
    }
    Ok(chain)
}

fn inherit<'a, T>(
    chain: &[&'a ProviderConfig],
    field: impl Fn(&'a ProviderConfig) -> Option<&'a T>,
) -> Option<&'a T> {
    chain.iter().find_map(|c| field(c))
}

fn resolve_provider(chain: &[&ProviderConfig], index: usize) -> Result<NameProvider> {
    let config = chain[0];
    let mut adjuster = ScoreAdjuster {
        forbidden: inherit(chain, |c| c.forbidden.as_ref())
            .cloned()
            .unwrap_or_default(),
        adjustments: inherit(chain, |c| c.adjustments.as_ref())
            .cloned()
            .unwrap_or_default(),
    };
    adjuster.compile().map_err(|e| {
        BackboneError::Config(format!("Provider {}: {}", config.id, e))
    })?;
    let mut key_adjuster = inherit(chain, |c| c.key_adjuster.as_ref())
        .cloned()
        .unwrap_or_default();
    key_adjuster.compile().map_err(|e| {
        BackboneError::Config(format!("Provider {}: {}", config.id, e))
    })?;

    let normalise_keys = |scores: &HashMap<String, i32>| {
        scores
            .iter()
            .map(|(name, score)| (insensitive(name), *score))
            .collect::<HashMap<_, _>>()
    };

    Ok(NameProvider {
        id: config.id.clone(),
        index,
        name: config.name.clone(),
        default_score: inherit(chain, |c| c.default_score.as_ref())
            .copied()
            .unwrap_or(DEFAULT_SCORE),
        specific_scores: inherit(chain, |c| c.specific_scores.as_ref())
            .map(normalise_keys)
            .unwrap_or_default(),
        owner: inherit(chain, |c| c.owner.as_ref())
            .map(|names| names.iter().map(|n| insensitive(n)).collect())
            .unwrap_or_default(),
        unranked_strategy: inherit(chain, |c| c.unranked_strategy.as_ref())
            .copied()
            .unwrap_or_default(),
        discard_strategy: inherit(chain, |c| c.discard_strategy.as_ref())
            .copied()
            .unwrap_or_default(),
        adjuster,
        key_adjuster,
        default_code: inherit(chain, |c| c.default_nomenclatural_code.as_ref()).copied(),
        default_parent_taxon: config.default_parent_taxon.clone(),
        scientific_name_changes: inherit(chain, |c| c.scientific_name_changes.as_ref())
            .cloned()
            .unwrap_or_default(),
        authorship_changes: inherit(chain, |c| c.scientific_name_authorship_changes.as_ref())
            .cloned()
            .unwrap_or_default(),
        loose: inherit(chain, |c| c.loose.as_ref()).copied().unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::{NameAnalyser, TaxonomicRank};
    use crate::core::rules::{MatchTaxonCondition, NameMatchType};
    use pretty_assertions::assert_eq;

    const PROVIDERS: &str = r#"[
        {
            "id": "base",
            "defaultScore": 120,
            "unrankedStrategy": "SYNONYMS_INFER",
            "forbidden": [
                {"type": "match", "taxonomicStatus": "misapplied"}
            ],
            "adjustments": [
                {"condition": {"type": "match", "taxonRank": "genus"}, "adjustment": 30}
            ]
        },
        {
            "id": "apc",
            "parent": "base",
            "specificScores": {"Acacia": 200, "Eucalyptus regnans": 300},
            "owner": ["Plantae"],
            "defaultNomenclaturalCode": "botanical"
        },
        {
            "id": "afd",
            "defaultScore": 80,
            "discardStrategy": "synonymTranslation"
        }
    ]"#;

    fn instance(name: &str, status: TaxonomicStatus) -> TaxonConceptInstance {
        let analysed = NameAnalyser::new()
            .analyse(Some(NomenclaturalCode::Botanical), name, None, None)
            .unwrap();
        let rank = analysed.implied_rank().unwrap_or(TaxonomicRank::Genus);
        let mut key = analysed.key;
        key.rank = rank;
        let mut instance = TaxonConceptInstance::new("T", 0, name, status, key);
        instance.rank = rank;
        instance
    }

    #[test]
    fn test_registry_order_and_inheritance() {
        let registry = ProviderRegistry::from_json(PROVIDERS).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.index_of("apc"), Some(1));

        let apc = registry.by_id("apc").unwrap();
        assert_eq!(apc.default_score, 120);
        assert_eq!(apc.unranked_strategy, UnrankedStrategy::SynonymsInfer);
        assert_eq!(apc.adjuster.forbidden.len(), 1);
        assert_eq!(apc.default_code, Some(NomenclaturalCode::Botanical));

        let afd = registry.by_id("afd").unwrap();
        assert_eq!(afd.default_score, 80);
        assert_eq!(afd.unranked_strategy, UnrankedStrategy::None);
        assert_eq!(afd.discard_strategy, DiscardStrategy::SynonymTranslation);
    }

    #[test]
    fn test_specific_scores() {
        let registry = ProviderRegistry::from_json(PROVIDERS).unwrap();
        let apc = registry.by_id("apc").unwrap();
        assert_eq!(
            apc.specific_score(&instance("Eucalyptus regnans", TaxonomicStatus::Accepted)),
            Some(300)
        );
        assert_eq!(
            apc.specific_score(&instance("Acacia dealbata", TaxonomicStatus::Accepted)),
            Some(200)
        );
        assert_eq!(
            apc.specific_score(&instance("Banksia serrata", TaxonomicStatus::Accepted)),
            None
        );
    }

    #[test]
    fn test_score_owned_forbidden_adjusted() {
        let registry = ProviderRegistry::from_json(PROVIDERS).unwrap();
        let apc = registry.by_id("apc").unwrap();

        let owned = instance("Plantae", TaxonomicStatus::Accepted);
        assert_eq!(apc.score(100, &owned), (MAX_SCORE, None));

        let misapplied = instance("Acacia dealbata", TaxonomicStatus::Misapplied);
        let (score, reason) = apc.score(100, &misapplied);
        assert_eq!(score, MIN_SCORE);
        assert_eq!(reason.as_deref(), Some("taxonomicStatus:misapplied"));

        let genus = instance("Acacia", TaxonomicStatus::Accepted);
        assert_eq!(apc.score(100, &genus), (130, None));

        assert_eq!(apc.score(990, &genus), (MAX_SCORE, None));
    }

    #[test]
    fn test_config_errors() {
        let unknown_parent = r#"[{"id": "a", "parent": "nope"}]"#;
        assert!(matches!(
            ProviderRegistry::from_json(unknown_parent),
            Err(BackboneError::Config(_))
        ));

        let duplicate = r#"[{"id": "a"}, {"id": "a"}]"#;
        assert!(matches!(
            ProviderRegistry::from_json(duplicate),
            Err(BackboneError::Config(_))
        ));

        let looped = r#"[{"id": "a", "parent": "b"}, {"id": "b", "parent": "a"}]"#;
        assert!(matches!(
            ProviderRegistry::from_json(looped),
            Err(BackboneError::Config(_))
        ));

        let bad_regex = r#"[{"id": "a", "forbidden": [
            {"type": "match", "scientificName": "(", "matchType": "regex"}
        ]}]"#;
        assert!(matches!(
            ProviderRegistry::from_json(bad_regex),
            Err(BackboneError::Config(_))
        ));

        let bad_field = r#"[{"id": "a", "forbidden": [{"type": "match", "colour": "red"}]}]"#;
        assert!(matches!(
            ProviderRegistry::from_json(bad_field),
            Err(BackboneError::Config(_))
        ));
    }

    #[test]
    fn test_unranked_strategy() {
        assert!(UnrankedStrategy::AllInfer.infer_rank());
        assert!(!UnrankedStrategy::Synonyms.infer_rank());
        assert!(UnrankedStrategy::All.reassigns(TaxonomicStatus::Accepted));
        assert!(UnrankedStrategy::Synonyms.reassigns(TaxonomicStatus::HeterotypicSynonym));
        assert!(!UnrankedStrategy::Synonyms.reassigns(TaxonomicStatus::InferredAccepted));
        assert!(UnrankedStrategy::InferredAndSynonyms.reassigns(TaxonomicStatus::InferredAccepted));
        assert!(!UnrankedStrategy::None.reassigns(TaxonomicStatus::Synonym));
        let strategy: UnrankedStrategy = serde_json::from_str("\"INFERRED_AND_SYNONYMS_INFER\"").unwrap();
        assert_eq!(strategy, UnrankedStrategy::InferredAndSynonymsInfer);
    }

    #[test]
    fn test_builder_and_ensure() {
        let mut registry = ProviderRegistry::new();
        let adjuster = ScoreAdjuster::new().forbid_when(
            MatchTaxonCondition::default()
                .with_scientific_name("Acacia", NameMatchType::Exact)
                .build()
                .unwrap(),
        );
        registry
            .add(NameProvider::new("a", 0).with_default_score(150).with_adjuster(adjuster))
            .unwrap();
        assert_eq!(registry.ensure("a"), 0);
        assert_eq!(registry.ensure("inferred"), 1);
        assert_eq!(registry.get(1).unwrap().default_score, DEFAULT_SCORE);
    }
}
