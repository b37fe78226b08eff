//! Writing a finalized taxonomy as a directory of delimited files.
//!
//! `meta.json` describes the files and their columns so readers do not have to
//! guess the delimiter or column order.

use crate::bio::TaxonomicStatus;
use crate::core::instance::{Classification, InstanceId};
use crate::core::provider::DiscardStrategy;
use crate::taxonomy::{BuildState, Discard, Taxonomy};
use crate::{BackboneError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const TAXON_FILE: &str = "taxon.csv";
pub const VARIANT_FILE: &str = "variant.csv";
pub const IDENTIFIER_FILE: &str = "identifier.csv";
pub const ISSUES_FILE: &str = "issues.csv";
pub const META_FILE: &str = "meta.json";
pub const METADATA_FILE: &str = "metadata.json";

pub const TAXON_COLUMNS: [&str; 20] = [
    "taxonID",
    "parentNameUsageID",
    "acceptedNameUsageID",
    "datasetID",
    "nomenclaturalCode",
    "scientificName",
    "scientificNameAuthorship",
    "taxonRank",
    "taxonomicStatus",
    "nomenclaturalStatus",
    "kingdom",
    "phylum",
    "class",
    "order",
    "family",
    "genus",
    "specificEpithet",
    "infraspecificEpithet",
    "score",
    "taxonRemarks",
];

pub const VARIANT_COLUMNS: [&str; 10] = [
    "taxonID",
    "variantID",
    "datasetID",
    "nomenclaturalCode",
    "scientificName",
    "scientificNameAuthorship",
    "taxonRank",
    "taxonomicStatus",
    "score",
    "forbidden",
];

pub const IDENTIFIER_COLUMNS: [&str; 4] = ["taxonID", "identifier", "datasetID", "taxonomicStatus"];

/// Schema descriptor written as `meta.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMeta {
    pub delimiter: char,
    pub core: String,
    pub files: Vec<ArchiveFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveFile {
    pub location: String,
    pub row_type: String,
    pub columns: Vec<String>,
}

impl ArchiveMeta {
    fn new(delimiter: char, write_issues: bool) -> Self {
        let file = |location: &str, row_type: &str, columns: &[&str]| ArchiveFile {
            location: location.to_string(),
            row_type: row_type.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        };
        let mut files = vec![
            file(TAXON_FILE, "taxon", &TAXON_COLUMNS),
            file(VARIANT_FILE, "variant", &VARIANT_COLUMNS),
            file(IDENTIFIER_FILE, "identifier", &IDENTIFIER_COLUMNS),
        ];
        if write_issues {
            files.push(file(
                ISSUES_FILE,
                "issue",
                &["kind", "code", "taxonID", "provider", "message"],
            ));
        }
        Self {
            delimiter,
            core: TAXON_FILE.to_string(),
            files,
        }
    }

    pub fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.delimiter).map_err(|_| {
            BackboneError::Config(format!("Delimiter {:?} is not a single byte", self.delimiter))
        })
    }
}

/// Build provenance written as `metadata.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMetadata {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub version: String,
    pub sources: Vec<String>,
    pub providers: Vec<String>,
    pub counts: BTreeMap<String, usize>,
    pub issues: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSummary {
    pub directory: PathBuf,
    pub taxa: usize,
    pub synonym_translations: usize,
    pub variants: usize,
    pub identifiers: usize,
}

impl Taxonomy {
    pub fn create_output<P: AsRef<Path>>(&self, dir: P) -> Result<OutputSummary> {
        self.expect_state("create_output", &[BuildState::Finalized])?;
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let write_metadata = self.config().output.write_metadata;
        let meta = ArchiveMeta::new(self.config().output.delimiter, write_metadata);
        let delimiter = meta.delimiter_byte()?;
        let mut summary = OutputSummary {
            directory: dir.to_path_buf(),
            ..OutputSummary::default()
        };

        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(dir.join(TAXON_FILE))?;
        writer.write_record(TAXON_COLUMNS)?;
        for id in self.representatives() {
            writer.write_record(self.taxon_row(id))?;
            summary.taxa += 1;
        }
        for (id, target) in self.synonym_translations() {
            writer.write_record(self.translation_row(id, target))?;
            summary.synonym_translations += 1;
        }
        writer.flush()?;

        let mut variants = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(dir.join(VARIANT_FILE))?;
        variants.write_record(VARIANT_COLUMNS)?;
        let mut identifiers = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(dir.join(IDENTIFIER_FILE))?;
        identifiers.write_record(IDENTIFIER_COLUMNS)?;

        for (id, instance) in self.instances().iter().enumerate() {
            let target = self.output_target(id);
            let target_id = target
                .map(|t| self.instance(t).taxon_id.as_str())
                .unwrap_or("");
            let provider = self.provider_label(instance).unwrap_or("");
            let score = instance.score().to_string();
            variants.write_record([
                target_id,
                instance.taxon_id.as_str(),
                provider,
                instance.code.map(|c| c.acronym()).unwrap_or(""),
                instance.scientific_name.as_str(),
                instance.authorship.as_deref().unwrap_or(""),
                instance.rank.label(),
                instance.status.label(),
                score.as_str(),
                instance.forbidden.as_deref().unwrap_or(""),
            ])?;
            summary.variants += 1;

            if let Some(target) = target.filter(|t| *t != id) {
                identifiers.write_record([
                    self.instance(target).taxon_id.as_str(),
                    instance.taxon_id.as_str(),
                    provider,
                    instance.status.label(),
                ])?;
                summary.identifiers += 1;
            }
        }
        variants.flush()?;
        identifiers.flush()?;

        fs::write(dir.join(META_FILE), serde_json::to_string_pretty(&meta)?)?;
        if write_metadata {
            self.report().write_csv(&dir.join(ISSUES_FILE), delimiter)?;
            let metadata = self.build_metadata();
            fs::write(dir.join(METADATA_FILE), serde_json::to_string_pretty(&metadata)?)?;
        }

        tracing::info!(
            "Wrote {} taxa, {} variants and {} identifiers to {}",
            summary.taxa,
            summary.variants,
            summary.identifiers,
            dir.display()
        );
        Ok(summary)
    }

    fn build_metadata(&self) -> BuildMetadata {
        BuildMetadata {
            id: Uuid::new_v4(),
            created: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            sources: self.sources().to_vec(),
            providers: self.providers().iter().map(|p| p.id.clone()).collect(),
            counts: self
                .report()
                .counts()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            issues: self
                .report()
                .by_kind()
                .into_iter()
                .map(|(k, v)| (k.label().to_string(), v))
                .collect(),
        }
    }

    /// Output identifier of a taxon, seen through its resolved accepted taxon
    pub(crate) fn accepted_id(&self, id: InstanceId) -> InstanceId {
        self.instance(id).resolved_accepted.unwrap_or(id)
    }

    /// Parent and accepted taxa of a representative as written to the output.
    /// A synonym carries only its accepted taxon.
    pub(crate) fn placement(&self, id: InstanceId) -> (Option<InstanceId>, Option<InstanceId>) {
        let accepted = Some(self.accepted_id(id)).filter(|a| *a != id);
        let parent = match accepted {
            Some(_) => None,
            None => self
                .instance(id)
                .resolved_parent
                .map(|p| self.accepted_id(p))
                .filter(|p| *p != id),
        };
        (parent, accepted)
    }

    /// Forbidden instances emitted as synonyms of their discard target
    pub(crate) fn synonym_translations(&self) -> impl Iterator<Item = (InstanceId, InstanceId)> + '_ {
        self.discards.iter().filter_map(|(id, discard)| match discard {
            Discard {
                strategy: DiscardStrategy::SynonymTranslation,
                target: Some(target),
            } => Some((*id, *target)),
            _ => None,
        })
    }

    fn taxon_row(&self, id: InstanceId) -> Vec<String> {
        let (parent, accepted) = self.placement(id);
        let status = self.instance(id).status;
        self.row(id, status, parent, accepted, &self.classification_of(id))
    }

    fn translation_row(&self, id: InstanceId, target: InstanceId) -> Vec<String> {
        let accepted = self.accepted_id(target);
        self.row(
            id,
            TaxonomicStatus::InferredSynonym,
            None,
            Some(accepted),
            &self.classification_of(accepted),
        )
    }

    fn row(
        &self,
        id: InstanceId,
        status: TaxonomicStatus,
        parent: Option<InstanceId>,
        accepted: Option<InstanceId>,
        classification: &Classification,
    ) -> Vec<String> {
        let instance = self.instance(id);
        let taxon_id = |i: Option<InstanceId>| {
            i.map(|i| self.instance(i).taxon_id.clone()).unwrap_or_default()
        };
        let text = |v: Option<&str>| v.unwrap_or("").to_string();

        let mut row = vec![
            instance.taxon_id.clone(),
            taxon_id(parent),
            taxon_id(accepted),
            instance
                .dataset_id
                .clone()
                .or_else(|| self.provider_label(instance).map(str::to_string))
                .unwrap_or_default(),
            text(instance.code.map(|c| c.acronym())),
            instance.scientific_name.clone(),
            text(instance.authorship.as_deref()),
            instance.rank.label().to_string(),
            status.label().to_string(),
            instance
                .nomenclatural_status
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join("|"),
        ];
        row.extend(Classification::HIGHER_RANKS.iter().rev().map(|r| text(classification.get(*r))));
        row.push(text(classification.specific_epithet.as_deref()));
        row.push(text(classification.infraspecific_epithet.as_deref()));
        row.push(instance.score().to_string());
        row.push(instance.remarks.join("; "));
        row
    }
}

pub fn read_meta<P: AsRef<Path>>(dir: P) -> Result<ArchiveMeta> {
    let contents = fs::read_to_string(dir.as_ref().join(META_FILE))?;
    Ok(serde_json::from_str(&contents)?)
}

/// Open one file of an exported directory, with its header positions
pub(crate) fn open_file(
    dir: &Path,
    location: &str,
    meta: &ArchiveMeta,
) -> Result<(csv::Reader<fs::File>, ExportColumns)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(meta.delimiter_byte()?)
        .flexible(true)
        .from_path(dir.join(location))?;
    let columns = ExportColumns::new(location, reader.headers()?)?;
    Ok((reader, columns))
}

/// Header name to position for an exported file
#[derive(Debug, Clone)]
pub(crate) struct ExportColumns {
    location: String,
    positions: BTreeMap<String, usize>,
}

impl ExportColumns {
    fn new(location: &str, headers: &csv::StringRecord) -> Result<Self> {
        Ok(Self {
            location: location.to_string(),
            positions: headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.to_string(), i))
                .collect(),
        })
    }

    pub(crate) fn require(&self, names: &[&str]) -> Result<()> {
        let missing: Vec<String> = names
            .iter()
            .filter(|n| !self.positions.contains_key(**n))
            .map(|n| n.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(BackboneError::Schema {
                source_name: self.location.clone(),
                missing,
            })
        }
    }

    pub(crate) fn get<'r>(&self, record: &'r csv::StringRecord, name: &str) -> Option<&'r str> {
        let position = *self.positions.get(name)?;
        record.get(position).map(str::trim).filter(|v| !v.is_empty())
    }
}

/// Identifier to output taxon identifier, read back from an exported directory
pub fn read_mapping<P: AsRef<Path>>(dir: P) -> Result<BTreeMap<String, String>> {
    let dir = dir.as_ref();
    let meta = read_meta(dir)?;
    let mut mapping = BTreeMap::new();

    let (mut taxa, columns) = open_file(dir, TAXON_FILE, &meta)?;
    columns.require(&["taxonID"])?;
    for record in taxa.records() {
        let record = record?;
        if let Some(id) = columns.get(&record, "taxonID") {
            mapping.insert(id.to_string(), id.to_string());
        }
    }

    let (mut identifiers, columns) = open_file(dir, IDENTIFIER_FILE, &meta)?;
    columns.require(&["taxonID", "identifier"])?;
    for record in identifiers.records() {
        let record = record?;
        if let (Some(target), Some(id)) = (
            columns.get(&record, "taxonID"),
            columns.get(&record, "identifier"),
        ) {
            mapping.insert(id.to_string(), target.to_string());
        }
    }
    Ok(mapping)
}
