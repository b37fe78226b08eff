//! The taxonomy orchestrator.
//!
//! A build runs `Created -> Loading -> LinksResolved -> TaxaResolved -> Finalized`.
//! Instances live in a flat arena and refer to each other by index; concepts and
//! scientific names group those indices.

pub mod links;
pub mod load;
pub mod output;
pub mod report;
pub mod resolve;

pub use load::Source;
pub use output::read_mapping;
pub use report::{BuildReport, Issue, IssueKind};

use crate::bio::{NameKey, NameType, TaxonomicRank, TaxonomicStatus};
use crate::core::concept::{ScientificName, TaxonConcept};
use crate::core::config::Config;
use crate::core::instance::{Classification, ConceptId, InstanceId, TaxonConceptInstance};
use crate::core::provider::{DiscardStrategy, NameProvider, ProviderRegistry};
use crate::core::resolver::{lub_all, ConceptResolver};
use crate::{BackboneError, Result};
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildState {
    Created,
    Loading,
    LinksResolved,
    TaxaResolved,
    Finalized,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BuildState::Created => "created",
            BuildState::Loading => "loading",
            BuildState::LinksResolved => "linksResolved",
            BuildState::TaxaResolved => "taxaResolved",
            BuildState::Finalized => "finalized",
        };
        f.write_str(label)
    }
}

/// How an instance whose concept has no eligible representative is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discard {
    pub strategy: DiscardStrategy,
    pub target: Option<InstanceId>,
}

pub struct Taxonomy {
    config: Config,
    providers: ProviderRegistry,
    pub(crate) instances: Vec<TaxonConceptInstance>,
    pub(crate) names: IndexMap<NameKey, ScientificName>,
    pub(crate) concepts: Vec<TaxonConcept>,
    /// (provider, taxon id) to instance
    pub(crate) by_id: HashMap<(usize, String), InstanceId>,
    pub(crate) discards: BTreeMap<InstanceId, Discard>,
    pub(crate) unknown: Option<InstanceId>,
    sources: Vec<String>,
    report: BuildReport,
    state: BuildState,
}

impl Taxonomy {
    pub fn new(config: Config, mut providers: ProviderRegistry) -> Self {
        providers.ensure(&config.taxonomy.inference_provider);
        Self {
            config,
            providers,
            instances: Vec::new(),
            names: IndexMap::new(),
            concepts: Vec::new(),
            by_id: HashMap::new(),
            discards: BTreeMap::new(),
            unknown: None,
            sources: Vec::new(),
            report: BuildReport::new(),
            state: BuildState::Created,
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn instances(&self) -> &[TaxonConceptInstance] {
        &self.instances
    }

    pub fn instance(&self, id: InstanceId) -> &TaxonConceptInstance {
        &self.instances[id]
    }

    pub fn concepts(&self) -> impl Iterator<Item = (ConceptId, &TaxonConcept)> {
        self.concepts
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_active())
    }

    pub fn concept(&self, id: ConceptId) -> &TaxonConcept {
        &self.concepts[id]
    }

    pub fn names(&self) -> impl Iterator<Item = &ScientificName> {
        self.names.values()
    }

    pub fn provider_of(&self, instance: &TaxonConceptInstance) -> Option<&NameProvider> {
        self.providers.get(instance.provider)
    }

    pub(crate) fn provider_label(&self, instance: &TaxonConceptInstance) -> Option<&str> {
        self.provider_of(instance).map(|p| p.id.as_str())
    }

    /// Instance by provider and source identifier
    pub fn find(&self, provider: &str, taxon_id: &str) -> Option<InstanceId> {
        let provider = self.providers.index_of(provider)?;
        self.by_id.get(&(provider, taxon_id.to_string())).copied()
    }

    /// First instance with this identifier, in provider declaration order
    pub fn find_by_taxon_id(&self, taxon_id: &str) -> Option<InstanceId> {
        (0..self.providers.len())
            .find_map(|p| self.by_id.get(&(p, taxon_id.to_string())).copied())
    }

    pub(crate) fn expect_state(&self, operation: &'static str, allowed: &[BuildState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(BackboneError::State {
                operation,
                state: self.state.to_string(),
            })
        }
    }

    pub(crate) fn set_state(&mut self, state: BuildState) {
        tracing::debug!("Taxonomy state {} -> {}", self.state, state);
        self.state = state;
    }

    pub(crate) fn add_source(&mut self, name: String) {
        self.sources.push(name);
    }

    /// Put an instance in the arena and group it by name and concept
    pub(crate) fn add_instance(&mut self, mut instance: TaxonConceptInstance) -> InstanceId {
        let id = self.instances.len();
        self.by_id
            .insert((instance.provider, instance.taxon_id.clone()), id);
        let concept = self.concept_for(&instance.key);
        instance.concept = Some(concept);
        self.instances.push(instance);
        self.concepts[concept].instances.push(id);
        id
    }

    /// Find or create the concept for a key
    pub(crate) fn concept_for(&mut self, key: &NameKey) -> ConceptId {
        let name_key = key.to_unranked_key();
        let entry = self.names.entry(name_key.clone());
        let name_index = entry.index();
        let name = entry.or_insert_with(|| ScientificName::new(name_key));
        if let Some(existing) = name
            .concepts
            .iter()
            .copied()
            .find(|c| self.concepts[*c].key == *key && self.concepts[*c].merged_into.is_none())
        {
            return existing;
        }
        let concept = self.concepts.len();
        self.concepts.push(TaxonConcept::new(key.clone(), name_index));
        name.concepts.push(concept);
        concept
    }

    /// Move an instance between concepts, taking on the new concept's rank
    pub(crate) fn move_instance(&mut self, id: InstanceId, target: ConceptId) {
        if let Some(current) = self.instances[id].concept {
            self.concepts[current].instances.retain(|i| *i != id);
        }
        let rank = self.concepts[target].rank();
        let instance = &mut self.instances[id];
        instance.concept = Some(target);
        instance.rank = rank;
        instance.key.rank = rank;
        self.concepts[target].instances.push(id);
    }

    /// The placeholder every broken chain can hang from
    pub(crate) fn ensure_unknown(&mut self) -> InstanceId {
        if let Some(id) = self.unknown {
            return id;
        }
        let provider = self.providers.ensure(&self.config.taxonomy.inference_provider);
        let taxon_id = self.config.taxonomy.unknown_taxon_id.clone();
        if let Some(existing) = self.by_id.get(&(provider, taxon_id.clone())).copied() {
            self.unknown = Some(existing);
            return existing;
        }
        let key = NameKey::new(
            None,
            "UNKNOWN TAXON",
            None,
            TaxonomicRank::Kingdom,
            NameType::Placeholder,
        );
        let mut instance = TaxonConceptInstance::new(
            taxon_id,
            provider,
            "Unknown Taxon",
            TaxonomicStatus::Accepted,
            key,
        );
        instance.note("Placeholder for taxa with no resolvable placement");
        let id = self.add_instance(instance);
        self.unknown = Some(id);
        id
    }

    pub(crate) fn resolver(&self) -> ConceptResolver<'_> {
        ConceptResolver {
            instances: &self.instances,
            concepts: &self.concepts,
            accepted_cutoff: self.config.taxonomy.accepted_cutoff,
            max_steps: self.config.taxonomy.max_resolution_steps,
        }
    }

    pub(crate) fn progress(&self, len: usize, message: &str) -> ProgressBar {
        if !self.config.performance.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message(message.to_string());
        pb
    }

    /// Run every remaining stage and the final pass
    pub fn resolve(&mut self) -> Result<()> {
        self.expect_state(
            "resolve",
            &[BuildState::Loading, BuildState::LinksResolved, BuildState::TaxaResolved],
        )?;
        if self.state == BuildState::Loading {
            self.resolve_links()?;
        }
        if self.state == BuildState::LinksResolved {
            self.resolve_taxon()?;
        }
        self.finalize()?;
        self.set_state(BuildState::Finalized);
        tracing::info!(
            "Resolved {} instances into {} taxa",
            self.instances.len(),
            self.representatives().len()
        );
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let links = {
            let resolver = self.resolver();
            (0..self.instances.len())
                .into_par_iter()
                .map(|id| self.final_links(&resolver, id))
                .collect::<Result<Vec<_>>>()?
        };
        for (id, (resolved, accepted, parent)) in links.into_iter().enumerate() {
            let instance = &mut self.instances[id];
            instance.resolved = Some(resolved);
            instance.resolved_accepted = Some(accepted);
            instance.resolved_parent = parent;
        }
        self.check_parent_chains()?;
        self.report.add("count.taxa", self.representatives().len());
        Ok(())
    }

    fn limit_error(&self, id: InstanceId, chain: &str) -> BackboneError {
        BackboneError::Structural {
            taxon_id: self.instances[id].taxon_id.clone(),
            message: format!(
                "{} chain exceeds {} steps",
                chain, self.config.taxonomy.max_resolution_steps
            ),
        }
    }

    /// Representative of an instance, failing on a chain that never settles
    fn chase(&self, resolver: &ConceptResolver<'_>, id: InstanceId) -> Result<InstanceId> {
        let resolved = resolver.representative(id);
        let settled = resolver.representative(resolved) == resolved;
        if settled {
            Ok(resolved)
        } else {
            Err(self.limit_error(id, "resolution"))
        }
    }

    /// Step past forbidden instances to their nearest usable ancestor
    fn skip_forbidden(&self, resolver: &ConceptResolver<'_>, id: InstanceId) -> Result<InstanceId> {
        let mut current = id;
        for _ in 0..self.config.taxonomy.max_resolution_steps {
            let instance = &self.instances[current];
            if !instance.is_forbidden() {
                return Ok(current);
            }
            match instance.parent {
                Some(parent) => current = self.chase(resolver, parent)?,
                None => return Ok(current),
            }
        }
        Err(self.limit_error(id, "forbidden parent"))
    }

    fn final_links(
        &self,
        resolver: &ConceptResolver<'_>,
        id: InstanceId,
    ) -> Result<(InstanceId, InstanceId, Option<InstanceId>)> {
        let resolved = self.chase(resolver, id)?;

        let mut accepted = resolved;
        let mut steps = 0;
        while let (false, Some(next)) = (
            self.instances[accepted].is_accepted(),
            self.instances[accepted].accepted,
        ) {
            steps += 1;
            if steps > self.config.taxonomy.max_resolution_steps {
                return Err(self.limit_error(id, "accepted"));
            }
            let next = self.skip_forbidden(resolver, self.chase(resolver, next)?)?;
            if next == accepted {
                break;
            }
            accepted = next;
        }
        // A chain that stops short of an accepted taxon leaves the instance its own accepted taxon
        if !self.instances[accepted].is_accepted() {
            accepted = if self.instances[resolved].is_accepted() {
                resolved
            } else {
                id
            };
        }

        let parent = self.concept_parent(resolver, resolved)?;
        Ok((resolved, accepted, parent))
    }

    /// Parent of a representative: the parents its members agree on, else their least upper bound
    fn concept_parent(&self, resolver: &ConceptResolver<'_>, rep: InstanceId) -> Result<Option<InstanceId>> {
        let mut members = vec![rep];
        if let Some(resolution) = self.instances[rep]
            .concept
            .and_then(|c| self.concepts[c].resolution.as_ref())
        {
            members.extend(resolution.children(rep));
        }

        let mut parents = Vec::new();
        for member in members {
            let instance = &self.instances[member];
            if instance.is_forbidden() || !instance.is_accepted() {
                continue;
            }
            if let Some(parent) = instance.parent {
                let parent = self.skip_forbidden(resolver, self.chase(resolver, parent)?)?;
                if parent != rep && !parents.contains(&parent) {
                    parents.push(parent);
                }
            }
        }
        let own = match self.instances[rep].parent {
            Some(parent) => Some(self.skip_forbidden(resolver, self.chase(resolver, parent)?)?),
            None => None,
        }
        .filter(|p| *p != rep);

        Ok(match parents.as_slice() {
            [] => own,
            [single] => Some(*single),
            _ => lub_all(resolver, parents.iter().copied())
                .filter(|p| *p != rep)
                .or(own),
        })
    }

    fn check_parent_chains(&self) -> Result<()> {
        let limit = self.config.taxonomy.max_resolution_steps;
        for id in self.representatives() {
            let mut current = id;
            let mut steps = 0;
            while let Some(parent) = self.instances[current].resolved_parent {
                steps += 1;
                if steps > limit {
                    return Err(self.limit_error(id, "parent"));
                }
                current = parent;
            }
        }
        Ok(())
    }

    /// Instances that appear as taxa in the output, in arena order
    pub fn representatives(&self) -> Vec<InstanceId> {
        (0..self.instances.len())
            .filter(|id| {
                let instance = &self.instances[*id];
                instance.resolved == Some(*id) && !instance.is_forbidden()
            })
            .collect()
    }

    /// The taxon an identifier maps to in the output, if any
    pub fn output_target(&self, id: InstanceId) -> Option<InstanceId> {
        let resolved = self.instances[id].resolved?;
        if !self.instances[resolved].is_forbidden() {
            return Some(resolved);
        }
        match self.discards.get(&resolved) {
            Some(Discard {
                strategy: DiscardStrategy::SynonymTranslation,
                target: Some(_),
            }) => Some(resolved),
            Some(Discard {
                strategy: DiscardStrategy::IdentifierTranslation,
                target,
            }) => *target,
            _ => None,
        }
    }

    /// Identifier to output taxon identifier, for every instance with a target
    pub fn mapping(&self) -> BTreeMap<String, String> {
        (0..self.instances.len())
            .filter_map(|id| {
                self.output_target(id).map(|target| {
                    (
                        self.instances[id].taxon_id.clone(),
                        self.instances[target].taxon_id.clone(),
                    )
                })
            })
            .collect()
    }

    /// Higher classification of a resolved taxon, read from its resolved parents
    pub fn classification_of(&self, id: InstanceId) -> Classification {
        let instance = &self.instances[id];
        let mut classification = Classification {
            specific_epithet: instance.classification.specific_epithet.clone(),
            infraspecific_epithet: instance.classification.infraspecific_epithet.clone(),
            ..Classification::default()
        };
        let start = instance.resolved_accepted.unwrap_or(id);
        let mut current = Some(start);
        let mut steps = 0;
        while let Some(node) = current {
            if steps > self.config.taxonomy.max_resolution_steps {
                break;
            }
            let ancestor = &self.instances[node];
            if Classification::HIGHER_RANKS.contains(&ancestor.rank)
                && classification.get(ancestor.rank).is_none()
            {
                classification.set(ancestor.rank, Some(ancestor.scientific_name.clone()));
            }
            current = ancestor.resolved_parent;
            steps += 1;
        }
        classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::NomenclaturalCode;

    fn taxonomy() -> Taxonomy {
        let mut providers = ProviderRegistry::new();
        providers.add(NameProvider::new("apc", 0)).unwrap();
        let mut config = Config::default();
        config.performance.progress = false;
        Taxonomy::new(config, providers)
    }

    fn key(name: &str, author: Option<&str>, rank: TaxonomicRank) -> NameKey {
        NameKey::new(
            Some(NomenclaturalCode::Botanical),
            name,
            author.map(str::to_string),
            rank,
            NameType::Scientific,
        )
    }

    #[test]
    fn test_inference_provider_added() {
        let taxonomy = taxonomy();
        assert_eq!(taxonomy.providers().len(), 2);
        assert_eq!(taxonomy.providers().index_of("inferred"), Some(1));
        assert_eq!(taxonomy.state(), BuildState::Created);
    }

    #[test]
    fn test_grouping() {
        let mut taxonomy = taxonomy();
        let a = taxonomy.add_instance(TaxonConceptInstance::new(
            "A",
            0,
            "Acacia",
            TaxonomicStatus::Accepted,
            key("ACACIA", Some("MILL"), TaxonomicRank::Genus),
        ));
        let b = taxonomy.add_instance(TaxonConceptInstance::new(
            "B",
            0,
            "Acacia",
            TaxonomicStatus::Accepted,
            key("ACACIA", None, TaxonomicRank::Genus),
        ));
        let c = taxonomy.add_instance(TaxonConceptInstance::new(
            "C",
            0,
            "Acacia",
            TaxonomicStatus::Accepted,
            key("ACACIA", Some("MILL"), TaxonomicRank::Genus),
        ));
        assert_eq!(taxonomy.names().count(), 1);
        assert_eq!(taxonomy.instance(a).concept, taxonomy.instance(c).concept);
        assert_ne!(taxonomy.instance(a).concept, taxonomy.instance(b).concept);
        assert_eq!(taxonomy.find("apc", "B"), Some(b));
        assert_eq!(taxonomy.find_by_taxon_id("C"), Some(c));
        assert_eq!(taxonomy.find("apc", "Z"), None);
    }

    #[test]
    fn test_move_instance() {
        let mut taxonomy = taxonomy();
        let a = taxonomy.add_instance(TaxonConceptInstance::new(
            "A",
            0,
            "Acacia",
            TaxonomicStatus::Accepted,
            key("ACACIA", None, TaxonomicRank::Unranked),
        ));
        let target = taxonomy.concept_for(&key("ACACIA", None, TaxonomicRank::Genus));
        taxonomy.move_instance(a, target);
        assert_eq!(taxonomy.instance(a).rank, TaxonomicRank::Genus);
        assert_eq!(taxonomy.concept(target).instances, vec![a]);
        assert_eq!(taxonomy.concepts().count(), 1);
    }

    #[test]
    fn test_state_enforced() {
        let mut taxonomy = taxonomy();
        match taxonomy.resolve() {
            Err(BackboneError::State { operation, state }) => {
                assert_eq!(operation, "resolve");
                assert_eq!(state, "created");
            }
            other => panic!("Expected state error, got {:?}", other.err()),
        }
        assert!(matches!(
            taxonomy.resolve_taxon(),
            Err(BackboneError::State { .. })
        ));
    }

    const HEADER: &str = "taxonID,scientificName,scientificNameAuthorship,taxonomicStatus,taxonRank,parentNameUsageID,acceptedNameUsageID,nomenclaturalCode";
    const EPITHETS: [&str; 8] = [
        "dealbata", "decurrens", "mearnsii", "baileyana", "pycnantha", "melanoxylon", "implexa", "verniciflua",
    ];

    fn resolved(rows: &[String]) -> Taxonomy {
        let mut taxonomy = taxonomy();
        let data = format!("{}\n{}\n", HEADER, rows.join("\n"));
        let source = crate::taxonomy::Source::from_reader("apc", "apc.csv", data.as_bytes(), b',').unwrap();
        taxonomy.load(&[source]).unwrap();
        taxonomy.resolve().unwrap();
        taxonomy
    }

    fn assert_accepted_sound(taxonomy: &Taxonomy) {
        for (id, instance) in taxonomy.instances().iter().enumerate() {
            let accepted = instance.resolved_accepted.unwrap();
            assert!(
                accepted == id || taxonomy.instance(accepted).is_accepted(),
                "{} resolves to non-accepted {}",
                instance.taxon_id,
                taxonomy.instance(accepted).taxon_id
            );
        }
    }

    #[test]
    fn test_synonym_loop_resolves_to_accepted() {
        let taxonomy = resolved(&[
            "A,Acacia dealbata,Link,synonym,species,,B,ICN".to_string(),
            "B,Racosperma dealbatum,(Link) Pedley,synonym,species,,A,ICN".to_string(),
        ]);
        assert_accepted_sound(&taxonomy);
        let a = taxonomy.find("apc", "A").unwrap();
        let b = taxonomy.find("apc", "B").unwrap();
        assert_eq!(taxonomy.instance(b).resolved_accepted, Some(a));
        assert_eq!(
            taxonomy.instance(a).resolved_parent,
            taxonomy.find("inferred", "ALA_The_Unknown_Taxon")
        );
    }

    #[test]
    fn test_unresolvable_synonym_is_its_own_accepted() {
        let taxonomy = resolved(&["E,Acacia dealbata,Link,excluded,species,,,ICN".to_string()]);
        assert_accepted_sound(&taxonomy);
    }

    proptest::proptest! {
        #[test]
        fn test_resolved_accepted_is_self_or_accepted(
            links in proptest::collection::vec(
                (proptest::bool::ANY, proptest::option::of(0..8usize), proptest::option::of(0..8usize)),
                8,
            )
        ) {
            let rows: Vec<String> = links
                .iter()
                .enumerate()
                .map(|(i, (synonym, parent, accepted))| {
                    let (status, accepted) = match (synonym, accepted) {
                        (true, Some(a)) => ("synonym", format!("T{}", a)),
                        _ => ("accepted", String::new()),
                    };
                    let parent = parent.map(|p| format!("T{}", p)).unwrap_or_default();
                    format!("T{},Acacia {},Link,{},species,{},{},ICN", i, EPITHETS[i], status, parent, accepted)
                })
                .collect();
            let taxonomy = resolved(&rows);
            assert_accepted_sound(&taxonomy);
        }
    }

    #[test]
    fn test_unknown_taxon_once() {
        let mut taxonomy = taxonomy();
        let first = taxonomy.ensure_unknown();
        let second = taxonomy.ensure_unknown();
        assert_eq!(first, second);
        assert_eq!(taxonomy.instance(first).taxon_id, "ALA_The_Unknown_Taxon");
        assert_eq!(taxonomy.instance(first).rank, TaxonomicRank::Kingdom);
    }
}
