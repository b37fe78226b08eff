//! The matching engine.
//!
//! A [`NameIndex`] is a read-only view of a finalized backbone, built either from a
//! [`Taxonomy`] in memory or from an exported directory. The [`searcher::Searcher`]
//! answers queries against it without locking.

pub mod error_type;
pub mod metrics;
pub mod searcher;

pub use error_type::{ErrorType, MatchType};
pub use metrics::{MatchMetrics, MatchTerms};

use crate::bio::names::{collapse_whitespace, insensitive};
use crate::bio::{
    AnalysedName, NameAnalyser, NameKey, NameType, NomenclaturalCode, TaxonomicRank,
    TaxonomicStatus,
};
use crate::core::instance::{Classification, InstanceId};
use crate::core::provider::DEFAULT_SCORE;
use crate::taxonomy::output::{open_file, read_meta, IDENTIFIER_FILE, TAXON_FILE};
use crate::taxonomy::{BuildState, Taxonomy};
use crate::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Position of an entry in the index
pub type EntryId = usize;

/// One taxon of the finalized backbone
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    #[serde(rename = "taxonID")]
    pub taxon_id: String,
    #[serde(rename = "datasetID")]
    pub dataset_id: Option<String>,
    pub code: Option<NomenclaturalCode>,
    pub scientific_name: String,
    pub authorship: Option<String>,
    pub rank: TaxonomicRank,
    pub status: TaxonomicStatus,
    #[serde(rename = "acceptedNameUsageID")]
    pub accepted_id: Option<String>,
    #[serde(rename = "parentNameUsageID")]
    pub parent_id: Option<String>,
    pub classification: Classification,
    pub priority: i32,
    /// Nested-set bounds over the accepted tree; zero for synonyms
    pub left: usize,
    pub right: usize,
    #[serde(skip)]
    pub name: AnalysedName,
}

impl IndexEntry {
    pub fn is_synonym(&self) -> bool {
        self.accepted_id.is_some()
    }

    pub fn is_excluded(&self) -> bool {
        self.status.is_excluded()
    }

    pub fn is_misapplied(&self) -> bool {
        self.status.is_misapplied()
    }

    /// True when `other` sits strictly inside this entry's subtree
    pub fn contains(&self, other: &IndexEntry) -> bool {
        self.right > 0 && other.left > self.left && other.left < self.right
    }

    pub fn terms(&self) -> MatchTerms<'_> {
        MatchTerms {
            kingdom: self.classification.kingdom.as_deref(),
            phylum: self.classification.phylum.as_deref(),
            class: self.classification.class.as_deref(),
            order: self.classification.order.as_deref(),
            family: self.classification.family.as_deref(),
            genus: self.classification.genus.as_deref(),
            specific_epithet: self.classification.specific_epithet.as_deref(),
            infraspecific_epithet: self.classification.infraspecific_epithet.as_deref(),
            authorship: self.authorship.as_deref(),
            rank: Some(self.rank),
        }
    }
}

/// An entry row before analysis and nested-set numbering
struct RawEntry {
    taxon_id: String,
    dataset_id: Option<String>,
    code: Option<NomenclaturalCode>,
    scientific_name: String,
    authorship: Option<String>,
    rank: TaxonomicRank,
    status: TaxonomicStatus,
    accepted_id: Option<String>,
    parent_id: Option<String>,
    classification: Classification,
    priority: i32,
}

#[derive(Debug, Default)]
pub struct NameIndex {
    entries: Vec<IndexEntry>,
    by_id: HashMap<String, EntryId>,
    /// Variant and duplicate identifiers to the taxon they map to
    aliases: HashMap<String, String>,
    by_exact: HashMap<String, Vec<EntryId>>,
    by_name: HashMap<String, Vec<EntryId>>,
    by_phrase: HashMap<(String, String), Vec<EntryId>>,
    by_voucher: HashMap<(String, String), Vec<EntryId>>,
    by_genus: HashMap<String, Vec<EntryId>>,
}

impl NameIndex {
    /// Index a finalized taxonomy, entry for entry the same rows `create_output` writes
    pub fn from_taxonomy(taxonomy: &Taxonomy) -> Result<Self> {
        taxonomy.expect_state("index", &[BuildState::Finalized])?;
        let label = |id: Option<InstanceId>| id.map(|i| taxonomy.instance(i).taxon_id.clone());
        let raw = |id: InstanceId,
                   status: TaxonomicStatus,
                   parent: Option<InstanceId>,
                   accepted: Option<InstanceId>,
                   classification: Classification| {
            let instance = taxonomy.instance(id);
            RawEntry {
                taxon_id: instance.taxon_id.clone(),
                dataset_id: instance
                    .dataset_id
                    .clone()
                    .or_else(|| taxonomy.provider_label(instance).map(str::to_string)),
                code: instance.code,
                scientific_name: instance.scientific_name.clone(),
                authorship: instance.authorship.clone(),
                rank: instance.rank,
                status,
                accepted_id: label(accepted),
                parent_id: label(parent),
                classification,
                priority: instance.score(),
            }
        };

        let mut rows = Vec::new();
        for id in taxonomy.representatives() {
            let (parent, accepted) = taxonomy.placement(id);
            rows.push(raw(
                id,
                taxonomy.instance(id).status,
                parent,
                accepted,
                taxonomy.classification_of(id),
            ));
        }
        for (id, target) in taxonomy.synonym_translations() {
            let accepted = taxonomy.accepted_id(target);
            rows.push(raw(
                id,
                TaxonomicStatus::InferredSynonym,
                None,
                Some(accepted),
                taxonomy.classification_of(accepted),
            ));
        }

        let aliases = taxonomy
            .mapping()
            .into_iter()
            .filter(|(id, target)| id != target)
            .collect();
        Ok(Self::build(rows, aliases))
    }

    /// Read an exported backbone directory
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let meta = read_meta(dir)?;

        let (mut reader, columns) = open_file(dir, TAXON_FILE, &meta)?;
        columns.require(&["taxonID", "scientificName", "taxonRank", "taxonomicStatus"])?;
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let text = |name: &str| columns.get(&record, name).map(str::to_string);
            let (Some(taxon_id), Some(scientific_name)) = (text("taxonID"), text("scientificName"))
            else {
                tracing::warn!("Skipping taxon row without an identifier or name");
                continue;
            };
            rows.push(RawEntry {
                taxon_id,
                dataset_id: text("datasetID"),
                code: columns
                    .get(&record, "nomenclaturalCode")
                    .and_then(NomenclaturalCode::parse),
                scientific_name,
                authorship: text("scientificNameAuthorship"),
                rank: columns
                    .get(&record, "taxonRank")
                    .and_then(TaxonomicRank::parse)
                    .unwrap_or_default(),
                status: columns
                    .get(&record, "taxonomicStatus")
                    .and_then(TaxonomicStatus::parse)
                    .unwrap_or(TaxonomicStatus::InferredUnplaced),
                accepted_id: text("acceptedNameUsageID"),
                parent_id: text("parentNameUsageID"),
                classification: Classification {
                    kingdom: text("kingdom"),
                    phylum: text("phylum"),
                    class: text("class"),
                    order: text("order"),
                    family: text("family"),
                    genus: text("genus"),
                    specific_epithet: text("specificEpithet"),
                    infraspecific_epithet: text("infraspecificEpithet"),
                },
                priority: columns
                    .get(&record, "score")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SCORE),
            });
        }

        let mut aliases = HashMap::new();
        if meta.files.iter().any(|f| f.location == IDENTIFIER_FILE) {
            let (mut reader, columns) = open_file(dir, IDENTIFIER_FILE, &meta)?;
            columns.require(&["taxonID", "identifier"])?;
            for record in reader.records() {
                let record = record?;
                if let (Some(target), Some(id)) = (
                    columns.get(&record, "taxonID"),
                    columns.get(&record, "identifier"),
                ) {
                    aliases.insert(id.to_string(), target.to_string());
                }
            }
        }

        let index = Self::build(rows, aliases);
        tracing::info!("Loaded {} index entries from {}", index.len(), dir.display());
        Ok(index)
    }

    fn build(rows: Vec<RawEntry>, aliases: HashMap<String, String>) -> Self {
        let analyser = NameAnalyser::new();
        let mut index = Self {
            aliases,
            ..Self::default()
        };

        for row in rows {
            let name = analyser
                .analyse(
                    row.code,
                    &row.scientific_name,
                    row.authorship.as_deref(),
                    Some(row.rank),
                )
                .unwrap_or_else(|err| {
                    tracing::debug!("Indexing {} unanalysed: {}", row.scientific_name, err);
                    unanalysed(&row)
                });
            let id = index.entries.len();
            if index.by_id.insert(row.taxon_id.clone(), id).is_some() {
                tracing::warn!("Duplicate taxon identifier {} in index", row.taxon_id);
            }
            index.by_exact.entry(insensitive(&row.scientific_name)).or_default().push(id);
            index.by_name.entry(name.key.scientific_name.clone()).or_default().push(id);
            if let Some(genus) = name.genus.as_deref().map(insensitive) {
                if let Some(phrase) = name.phrase.as_deref() {
                    index.by_phrase.entry((genus.clone(), phrase_key(phrase))).or_default().push(id);
                }
                if let Some(voucher) = name.voucher.as_deref() {
                    index.by_voucher.entry((genus.clone(), phrase_key(voucher))).or_default().push(id);
                }
                if name.is_binomial() && name.key.is_formal() {
                    index.by_genus.entry(genus).or_default().push(id);
                }
            }
            index.entries.push(IndexEntry {
                taxon_id: row.taxon_id,
                dataset_id: row.dataset_id,
                code: row.code,
                scientific_name: row.scientific_name,
                authorship: row.authorship,
                rank: row.rank,
                status: row.status,
                accepted_id: row.accepted_id,
                parent_id: row.parent_id,
                classification: row.classification,
                priority: row.priority,
                left: 0,
                right: 0,
                name,
            });
        }
        index.number_tree();
        index
    }

    /// Assign nested-set bounds with an iterative depth-first walk over accepted entries
    fn number_tree(&mut self) {
        let mut children: HashMap<EntryId, Vec<EntryId>> = HashMap::new();
        let mut roots = Vec::new();
        for (id, entry) in self.entries.iter().enumerate() {
            if entry.is_synonym() {
                continue;
            }
            match entry.parent_id.as_ref().and_then(|p| self.by_id.get(p)) {
                Some(parent) if *parent != id => children.entry(*parent).or_default().push(id),
                _ => roots.push(id),
            }
        }

        let mut counter = 1;
        let mut visited = HashSet::new();
        for root in roots {
            let mut stack = vec![(root, false)];
            while let Some((id, exiting)) = stack.pop() {
                if exiting {
                    self.entries[id].right = counter;
                    counter += 1;
                    continue;
                }
                if !visited.insert(id) {
                    continue;
                }
                self.entries[id].left = counter;
                counter += 1;
                stack.push((id, true));
                if let Some(kids) = children.get(&id) {
                    stack.extend(kids.iter().rev().map(|k| (*k, false)));
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn entry(&self, id: EntryId) -> &IndexEntry {
        &self.entries[id]
    }

    /// Entry for an identifier, following variant and duplicate identifiers
    pub fn get(&self, taxon_id: &str) -> Option<&IndexEntry> {
        self.lookup_id(taxon_id).map(|id| &self.entries[id])
    }

    pub(crate) fn lookup_id(&self, taxon_id: &str) -> Option<EntryId> {
        self.by_id.get(taxon_id).copied().or_else(|| {
            self.aliases
                .get(taxon_id)
                .and_then(|target| self.by_id.get(target))
                .copied()
        })
    }

    /// Accepted entry of a synonym
    pub fn accepted_of(&self, entry: &IndexEntry) -> Option<&IndexEntry> {
        entry
            .accepted_id
            .as_deref()
            .and_then(|id| self.by_id.get(id))
            .map(|id| &self.entries[*id])
    }

    pub(crate) fn exact(&self, name: &str) -> &[EntryId] {
        self.by_exact.get(&insensitive(name)).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn canonical(&self, key: &NameKey) -> &[EntryId] {
        self.by_name.get(&key.scientific_name).map_or(&[], Vec::as_slice)
    }

    /// Phrase names by genus and phrase, else by genus and voucher
    pub(crate) fn phrase(&self, name: &AnalysedName) -> &[EntryId] {
        let Some(genus) = name.genus.as_deref().map(insensitive) else {
            return &[];
        };
        let by_phrase = name
            .phrase
            .as_deref()
            .and_then(|p| self.by_phrase.get(&(genus.clone(), phrase_key(p))));
        let by_voucher = name
            .voucher
            .as_deref()
            .and_then(|v| self.by_voucher.get(&(genus, phrase_key(v))));
        by_phrase.or(by_voucher).map_or(&[], Vec::as_slice)
    }

    /// Binomials in a genus, for fuzzy matching of the epithets
    pub(crate) fn in_genus(&self, genus: &str) -> &[EntryId] {
        self.by_genus.get(&insensitive(genus)).map_or(&[], Vec::as_slice)
    }
}

fn phrase_key(phrase: &str) -> String {
    collapse_whitespace(
        &phrase
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect::<String>(),
    )
    .to_uppercase()
}

fn unanalysed(row: &RawEntry) -> AnalysedName {
    AnalysedName {
        key: NameKey::new(
            row.code,
            insensitive(&row.scientific_name),
            None,
            row.rank,
            NameType::NoName,
        ),
        display: row.scientific_name.clone(),
        display_author: row.authorship.clone(),
        genus: None,
        specific_epithet: None,
        infraspecific_epithet: None,
        cultivar: None,
        phrase: None,
        voucher: None,
        markers: Default::default(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::provider::ProviderRegistry;
    use crate::taxonomy::Source;
    use tempfile::TempDir;

    const HEADER: &str = "taxonID,scientificName,scientificNameAuthorship,taxonomicStatus,taxonRank,parentNameUsageID,acceptedNameUsageID,nomenclaturalCode,kingdom,family";

    /// A small backbone with a cross-kingdom homonym, a synonym and a phrase name
    pub(crate) fn sample_taxonomy() -> Taxonomy {
        let rows = [
            "P,Plantae,,accepted,kingdom,,,ICN,,",
            "A,Animalia,,accepted,kingdom,,,ICZN,,",
            "F1,Asteraceae,,accepted,family,P,,ICN,Plantae,",
            "F2,Fabaceae,,accepted,family,P,,ICN,Plantae,",
            "F3,Tenebrionidae,,accepted,family,A,,ICZN,Animalia,",
            "G1,Simsia,Pers.,accepted,genus,F1,,ICN,Plantae,Asteraceae",
            "G2,Simsia,Champion,accepted,genus,F3,,ICZN,Animalia,Tenebrionidae",
            "G3,Acacia,Mill.,accepted,genus,F2,,ICN,Plantae,Fabaceae",
            "S1,Acacia dealbata,Link,accepted,species,G3,,ICN,Plantae,Fabaceae",
            "S2,Acacia sp. Bungonia (D.Smith 123),,accepted,species,G3,,ICN,Plantae,Fabaceae",
            "Y1,Racosperma dealbatum,(Link) Pedley,synonym,species,,S1,ICN,Plantae,Fabaceae",
            "G4,Thelymitra,Sw.,accepted,genus,P,,ICN,Plantae,",
            "S3,Thelymitra pauciflora,R.Br.,accepted,species,G4,,ICN,Plantae,",
        ];
        let data = format!("{}\n{}\n", HEADER, rows.join("\n"));
        let providers = ProviderRegistry::from_json(r#"[{"id": "apc", "defaultScore": 200}]"#).unwrap();
        let mut config = Config::default();
        config.performance.progress = false;
        let mut taxonomy = Taxonomy::new(config, providers);
        let source = Source::from_reader("apc", "sample.csv", data.as_bytes(), b',').unwrap();
        taxonomy.load(&[source]).unwrap();
        taxonomy.resolve().unwrap();
        taxonomy
    }

    #[test]
    fn test_from_taxonomy() {
        let index = NameIndex::from_taxonomy(&sample_taxonomy()).unwrap();
        let dealbata = index.get("S1").unwrap();
        assert_eq!(dealbata.classification.genus.as_deref(), Some("Acacia"));
        assert_eq!(dealbata.classification.family.as_deref(), Some("Fabaceae"));
        assert_eq!(dealbata.priority, 200);

        let synonym = index.get("Y1").unwrap();
        assert!(synonym.is_synonym());
        assert_eq!(index.accepted_of(synonym).unwrap().taxon_id, "S1");
        assert_eq!(index.exact("simsia").len(), 2);
    }

    #[test]
    fn test_nested_sets() {
        let index = NameIndex::from_taxonomy(&sample_taxonomy()).unwrap();
        let plantae = index.get("P").unwrap();
        let acacia = index.get("G3").unwrap();
        let dealbata = index.get("S1").unwrap();
        let animal_simsia = index.get("G2").unwrap();
        assert!(plantae.contains(acacia));
        assert!(acacia.contains(dealbata));
        assert!(!dealbata.contains(acacia));
        assert!(!plantae.contains(animal_simsia));
        assert_eq!(index.get("Y1").unwrap().left, 0);
    }

    #[test]
    fn test_phrase_lookup() {
        let index = NameIndex::from_taxonomy(&sample_taxonomy()).unwrap();
        let name = NameAnalyser::new()
            .analyse(None, "Acacia sp. Bungonia", None, None)
            .unwrap();
        let found = index.phrase(&name);
        assert_eq!(found.len(), 1);
        assert_eq!(index.entry(found[0]).taxon_id, "S2");
    }

    #[test]
    fn test_requires_finalized() {
        let taxonomy = Taxonomy::new(Config::default(), ProviderRegistry::new());
        assert!(NameIndex::from_taxonomy(&taxonomy).is_err());
    }

    #[test]
    fn test_load_matches_in_memory() {
        let taxonomy = sample_taxonomy();
        let dir = TempDir::new().unwrap();
        taxonomy.create_output(dir.path()).unwrap();

        let loaded = NameIndex::load(dir.path()).unwrap();
        let built = NameIndex::from_taxonomy(&taxonomy).unwrap();
        assert_eq!(loaded.len(), built.len());
        let simsia = loaded.get("G2").unwrap();
        assert_eq!(simsia.code, Some(NomenclaturalCode::Zoological));
        assert_eq!(simsia.classification.kingdom.as_deref(), Some("Animalia"));
        assert_eq!(simsia.left, built.get("G2").unwrap().left);
    }
}
