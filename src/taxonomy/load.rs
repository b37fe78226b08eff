//! Reading provider exports into the instance arena.

use crate::bio::names::collapse_whitespace;
use crate::bio::{NameAnalyser, NomenclaturalCode, TaxonomicRank, TaxonomicStatus};
use crate::core::instance::{Classification, TaxonConceptInstance};
use crate::core::provider::NameProvider;
use crate::taxonomy::report::{BuildReport, IssueKind};
use crate::taxonomy::{BuildState, Taxonomy};
use crate::{BackboneError, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const REQUIRED_COLUMNS: [&str; 8] = [
    "taxonID",
    "scientificName",
    "scientificNameAuthorship",
    "taxonomicStatus",
    "taxonRank",
    "parentNameUsageID",
    "acceptedNameUsageID",
    "nomenclaturalCode",
];

#[derive(Debug, Clone)]
enum SourceInput {
    File(PathBuf),
    Memory { data: String, delimiter: u8 },
}

/// One delimited export belonging to a provider
#[derive(Debug, Clone)]
pub struct Source {
    pub provider: String,
    pub name: String,
    input: SourceInput,
}

impl Source {
    pub fn new(provider: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            provider: provider.into(),
            name: path.display().to_string(),
            input: SourceInput::File(path),
        }
    }

    /// An in-memory source, read fully from `reader`
    pub fn from_reader<R: Read>(
        provider: impl Into<String>,
        name: impl Into<String>,
        mut reader: R,
        delimiter: u8,
    ) -> Result<Self> {
        let mut data = String::new();
        reader.read_to_string(&mut data)?;
        Ok(Self {
            provider: provider.into(),
            name: name.into(),
            input: SourceInput::Memory { data, delimiter },
        })
    }

    /// Comma for `.csv` files, tab for anything else
    pub fn delimiter(&self) -> u8 {
        match &self.input {
            SourceInput::File(path) => delimiter_for(path),
            SourceInput::Memory { delimiter, .. } => *delimiter,
        }
    }

    fn reader(&self) -> Result<csv::Reader<Box<dyn Read + '_>>> {
        let input: Box<dyn Read + '_> = match &self.input {
            SourceInput::File(path) => Box::new(std::fs::File::open(path)?),
            SourceInput::Memory { data, .. } => Box::new(data.as_bytes()),
        };
        Ok(csv::ReaderBuilder::new()
            .delimiter(self.delimiter())
            .flexible(true)
            .from_reader(input))
    }
}

/// `provider=path`, as given on the command line
impl FromStr for Source {
    type Err = BackboneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((provider, path)) if !provider.trim().is_empty() && !path.trim().is_empty() => {
                Ok(Source::new(provider.trim(), path.trim()))
            }
            _ => Err(BackboneError::Config(format!(
                "Expected provider=path, got {}",
                s
            ))),
        }
    }
}

pub fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => b',',
        _ => b'\t',
    }
}

/// Column positions by header name
struct Columns {
    positions: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &csv::StringRecord, source: &str) -> Result<Self> {
        let positions: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (clean_header(h), i))
            .collect();
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| !positions.contains_key(**c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(BackboneError::Schema {
                source_name: source.to_string(),
                missing,
            });
        }
        Ok(Self { positions })
    }

    fn get<'r>(&self, record: &'r csv::StringRecord, column: &str) -> Option<&'r str> {
        self.positions
            .get(column)
            .and_then(|i| record.get(*i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Header without byte-order mark or namespace prefix
fn clean_header(header: &str) -> String {
    let header = header.trim().trim_start_matches('\u{feff}');
    match header.rsplit_once(':') {
        Some((_, term)) if !header.contains("//") => term.to_string(),
        _ => header.rsplit('/').next().unwrap_or(header).to_string(),
    }
}

/// Parse a whole source. Only schema and I/O problems are errors; bad rows become issues.
pub(crate) fn parse_source(
    source: &Source,
    provider: &NameProvider,
    analyser: &NameAnalyser,
    report: &BuildReport,
) -> Result<Vec<TaxonConceptInstance>> {
    let mut reader = source.reader()?;
    let headers = reader.headers()?.clone();
    let columns = Columns::new(&headers, &source.name)?;

    let mut instances = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let line = row + 2;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                report.issue(
                    IssueKind::Problem,
                    "load.badRow",
                    format!("{} line {}: {}", source.name, line, e),
                );
                report.count("count.load.skipped");
                continue;
            }
        };
        match parse_record(&record, &columns, provider, analyser, report) {
            Ok(instance) => instances.push(instance),
            Err(message) => {
                report.issue(
                    IssueKind::Problem,
                    "load.badRow",
                    format!("{} line {}: {}", source.name, line, message),
                );
                report.count("count.load.skipped");
            }
        }
    }
    tracing::debug!("Read {} records from {}", instances.len(), source.name);
    Ok(instances)
}

fn parse_record(
    record: &csv::StringRecord,
    columns: &Columns,
    provider: &NameProvider,
    analyser: &NameAnalyser,
    report: &BuildReport,
) -> std::result::Result<TaxonConceptInstance, String> {
    let taxon_id = columns
        .get(record, "taxonID")
        .ok_or_else(|| "missing taxonID".to_string())?;
    let raw_name = columns
        .get(record, "scientificName")
        .ok_or_else(|| format!("{} has no scientificName", taxon_id))?;
    let name = collapse_whitespace(provider.correct_name(raw_name));
    let authorship = columns
        .get(record, "scientificNameAuthorship")
        .map(|a| collapse_whitespace(provider.correct_authorship(a)))
        .filter(|a| !a.is_empty());

    let code = match columns.get(record, "nomenclaturalCode") {
        Some(label) => NomenclaturalCode::parse(label).or_else(|| {
            report.once(
                label,
                IssueKind::Validation,
                "code.unknown",
                format!("Unknown nomenclatural code {}", label),
            );
            provider.default_code
        }),
        None => provider.default_code,
    };
    let rank = match columns.get(record, "taxonRank") {
        Some(label) => TaxonomicRank::parse(label).unwrap_or_else(|| {
            report.once(
                label,
                IssueKind::Validation,
                "rank.unknown",
                format!("Unknown rank {}", label),
            );
            TaxonomicRank::Unranked
        }),
        None => TaxonomicRank::Unranked,
    };
    let accepted_id = columns.get(record, "acceptedNameUsageID").filter(|a| *a != taxon_id);
    let status = match columns.get(record, "taxonomicStatus") {
        Some(label) => TaxonomicStatus::parse(label).unwrap_or_else(|| {
            report.once(
                label,
                IssueKind::Validation,
                "status.unknown",
                format!("Unknown taxonomic status {}", label),
            );
            TaxonomicStatus::InferredUnplaced
        }),
        None if accepted_id.is_some() => TaxonomicStatus::InferredSynonym,
        None => TaxonomicStatus::InferredAccepted,
    };

    let analysed = analyser
        .analyse(code, &name, authorship.as_deref(), Some(rank))
        .map_err(|e| format!("{}: {}", taxon_id, e))?;

    let mut instance =
        TaxonConceptInstance::new(taxon_id, provider.index, name, status, analysed.key.clone());
    instance.code = code;
    instance.rank = rank;
    instance.authorship = authorship;
    instance.implied_rank = analysed.implied_rank();
    instance.dataset_id = columns.get(record, "datasetID").map(str::to_string);
    instance.year = columns.get(record, "namePublishedInYear").map(str::to_string);
    instance.parent_name_usage_id = columns
        .get(record, "parentNameUsageID")
        .filter(|p| *p != taxon_id)
        .map(str::to_string);
    instance.accepted_name_usage_id = accepted_id.map(str::to_string);
    instance.nomenclatural_status = columns
        .get(record, "nomenclaturalStatus")
        .map(|s| {
            s.split([',', '|'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut classification = Classification::default();
    for rank in Classification::HIGHER_RANKS {
        classification.set(rank, columns.get(record, rank.label()).map(str::to_string));
    }
    if provider.loose && instance.parent_name_usage_id.is_none() && classification.genus.is_none() {
        classification.genus = analysed.genus.clone().filter(|g| *g != instance.scientific_name);
    }
    classification.specific_epithet = columns
        .get(record, "specificEpithet")
        .map(str::to_string)
        .or_else(|| analysed.specific_epithet.clone());
    classification.infraspecific_epithet = columns
        .get(record, "infraspecificEpithet")
        .map(str::to_string)
        .or_else(|| analysed.infraspecific_epithet.clone());
    instance.classification = classification;
    if let Some(remarks) = columns.get(record, "taxonRemarks") {
        instance.note(remarks);
    }

    instance.key = provider.adjust_key(analysed.key, &instance);
    Ok(instance)
}

impl Taxonomy {
    /// Parse sources in parallel, then add their instances in provider, source name and row order
    pub fn load(&mut self, sources: &[Source]) -> Result<()> {
        self.expect_state("load", &[BuildState::Created, BuildState::Loading])?;
        self.set_state(BuildState::Loading);

        let mut indexed = Vec::with_capacity(sources.len());
        for (position, source) in sources.iter().enumerate() {
            let provider = self.providers().index_of(&source.provider).ok_or_else(|| {
                BackboneError::Config(format!(
                    "Source {} names unknown provider {}",
                    source.name, source.provider
                ))
            })?;
            indexed.push((provider, position, source));
        }

        let pb = self.progress(sources.len(), "Reading sources");
        let analyser = NameAnalyser::new();
        let parsed = {
            let providers = self.providers();
            let report = self.report();
            indexed
                .par_iter()
                .map(|(provider, position, source)| {
                    let provider_config = providers.get(*provider).ok_or_else(|| {
                        BackboneError::Config(format!("No provider at index {}", provider))
                    })?;
                    let instances = parse_source(source, provider_config, &analyser, report)?;
                    pb.inc(1);
                    Ok((*provider, *position, source.name.clone(), instances))
                })
                .collect::<Result<Vec<_>>>()?
        };
        pb.finish_and_clear();

        // One provider's sources are taken in name order, so a duplicate id keeps the same row
        let mut parsed = parsed;
        parsed.sort_by(|(pa, a, na, _), (pb, b, nb, _)| {
            pa.cmp(pb).then_with(|| na.cmp(nb)).then_with(|| a.cmp(b))
        });

        let mut seen: HashMap<(usize, String), Option<String>> =
            self.by_id.keys().map(|key| (key.clone(), None)).collect();
        for (provider, _, name, instances) in parsed {
            let count = instances.len();
            for instance in instances {
                let key = (provider, instance.taxon_id.clone());
                if let Some(first) = seen.get(&key) {
                    let provider_label = self.providers().get(provider).map(|p| p.id.clone());
                    let first = first.as_deref().unwrap_or("an earlier load");
                    self.report().instance(
                        IssueKind::Problem,
                        "load.duplicateId",
                        &instance,
                        provider_label.as_deref(),
                        format!(
                            "Duplicate identifier {} in {}, already read from {}",
                            instance.taxon_id, name, first
                        ),
                    );
                    self.report().count("count.load.skipped");
                    continue;
                }
                seen.insert(key, Some(name.clone()));
                self.add_instance(instance);
                self.report().count("count.load.instances");
            }
            tracing::info!("Loaded {} records from {}", count, name);
            self.add_source(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::provider::ProviderRegistry;
    use pretty_assertions::assert_eq;

    const HEADER: &str = "taxonID,scientificName,scientificNameAuthorship,taxonomicStatus,taxonRank,parentNameUsageID,acceptedNameUsageID,nomenclaturalCode,kingdom,family";

    fn registry() -> ProviderRegistry {
        ProviderRegistry::from_json(
            r#"[{"id": "apc", "defaultNomenclaturalCode": "botanical",
                 "scientificNameChanges": {"Acaica": "Acacia"}}, {"id": "afd"}]"#,
        )
        .unwrap()
    }

    fn taxonomy() -> Taxonomy {
        let mut config = Config::default();
        config.performance.progress = false;
        Taxonomy::new(config, registry())
    }

    fn source(provider: &str, rows: &[&str]) -> Source {
        let data = format!("{}\n{}\n", HEADER, rows.join("\n"));
        Source::from_reader(provider, format!("{}.csv", provider), data.as_bytes(), b',').unwrap()
    }

    #[test]
    fn test_load_rows() {
        let mut taxonomy = taxonomy();
        let apc = source(
            "apc",
            &[
                "A1,Acaica,Mill.,accepted,genus,,,ICN,Plantae,Fabaceae",
                "A2,Acacia dealbata,Link,accepted,species,A1,,,Plantae,Fabaceae",
                "A3,Racosperma dealbatum,(Link) Pedley,synonym,species,,A2,ICN,,",
            ],
        );
        taxonomy.load(&[apc]).unwrap();
        assert_eq!(taxonomy.state(), BuildState::Loading);
        assert_eq!(taxonomy.instances().len(), 3);

        let genus = taxonomy.instance(taxonomy.find("apc", "A1").unwrap());
        assert_eq!(genus.scientific_name, "Acacia");
        assert_eq!(genus.rank, TaxonomicRank::Genus);
        assert_eq!(genus.classification.family.as_deref(), Some("Fabaceae"));

        let species = taxonomy.instance(taxonomy.find("apc", "A2").unwrap());
        assert_eq!(species.code, Some(NomenclaturalCode::Botanical));
        assert_eq!(species.parent_name_usage_id.as_deref(), Some("A1"));
        assert_eq!(species.classification.specific_epithet.as_deref(), Some("dealbata"));

        let synonym = taxonomy.instance(taxonomy.find("apc", "A3").unwrap());
        assert_eq!(synonym.status, TaxonomicStatus::Synonym);
        assert_eq!(synonym.accepted_name_usage_id.as_deref(), Some("A2"));
        assert_eq!(taxonomy.report().get("count.load.instances"), 3);
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let mut taxonomy = taxonomy();
        let apc = source(
            "apc",
            &[
                ",Acacia,,accepted,genus,,,,,",
                "A2,,,accepted,species,,,,,",
                "A3,Tobacco mosaic virus,,accepted,species,,,ICN,,",
                "A4,Acacia dealbata,Link,accepted,sectio nova,,,,,",
                "A4,Acacia dealbata,Link,accepted,species,,,,,",
            ],
        );
        taxonomy.load(&[apc]).unwrap();
        assert_eq!(taxonomy.instances().len(), 1);
        assert_eq!(taxonomy.instance(0).rank, TaxonomicRank::Unranked);
        assert_eq!(taxonomy.report().get("count.load.skipped"), 4);
        assert_eq!(taxonomy.report().with_code("rank.unknown").len(), 1);
        assert_eq!(taxonomy.report().with_code("load.duplicateId").len(), 1);
    }

    #[test]
    fn test_duplicate_across_sources_ignores_argument_order() {
        let named = |name: &str, row: &str| {
            let data = format!("{}\n{}\n", HEADER, row);
            Source::from_reader("apc", name, data.as_bytes(), b',').unwrap()
        };
        let early = || named("apc-2019.csv", "A1,Acacia dealbata,Link,accepted,species,,,,,");
        let late = || named("apc-2024.csv", "A1,Acacia dealbata,Link,accepted,subspecies,,,,,");

        for sources in [[early(), late()], [late(), early()]] {
            let mut taxonomy = taxonomy();
            taxonomy.load(&sources).unwrap();
            assert_eq!(taxonomy.instances().len(), 1);
            assert_eq!(taxonomy.instance(0).rank, TaxonomicRank::Species);

            let issues = taxonomy.report().with_code("load.duplicateId");
            assert_eq!(issues.len(), 1);
            assert!(issues[0].message.contains("in apc-2024.csv"));
            assert!(issues[0].message.contains("already read from apc-2019.csv"));
        }
    }

    #[test]
    fn test_schema_error() {
        let mut taxonomy = taxonomy();
        let data = "taxonID,scientificName,taxonRank\nA1,Acacia,genus\n";
        let bad = Source::from_reader("apc", "bad.csv", data.as_bytes(), b',').unwrap();
        match taxonomy.load(&[bad]) {
            Err(BackboneError::Schema { source_name, missing }) => {
                assert_eq!(source_name, "bad.csv");
                assert!(missing.contains(&"taxonomicStatus".to_string()));
                assert!(missing.contains(&"nomenclaturalCode".to_string()));
                assert!(!missing.contains(&"taxonRank".to_string()));
            }
            other => panic!("Expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_provider() {
        let mut taxonomy = taxonomy();
        let stray = source("nope", &["A1,Acacia,,accepted,genus,,,,,"]);
        assert!(matches!(taxonomy.load(&[stray]), Err(BackboneError::Config(_))));
    }

    #[test]
    fn test_grouping_ignores_source_order() {
        let afd = || source("afd", &["B1,Acacia dealbata,Link,accepted,species,,,ICN,,"]);
        let apc = || source("apc", &["A1,Acacia dealbata,Link,accepted,species,,,ICN,,"]);

        let mut forward = taxonomy();
        forward.load(&[apc(), afd()]).unwrap();
        let mut backward = taxonomy();
        backward.load(&[afd(), apc()]).unwrap();

        let ids = |t: &Taxonomy| t.instances().iter().map(|i| i.taxon_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&forward), ids(&backward));
        assert_eq!(forward.concepts().count(), 1);
    }

    #[test]
    fn test_source_from_str() {
        let source: Source = "apc=data/apc.csv".parse().unwrap();
        assert_eq!(source.provider, "apc");
        assert_eq!(source.delimiter(), b',');
        let source: Source = "afd=data/afd.txt".parse().unwrap();
        assert_eq!(source.delimiter(), b'\t');
        assert!("data/apc.csv".parse::<Source>().is_err());
    }

    #[test]
    fn test_clean_header() {
        assert_eq!(clean_header("\u{feff}taxonID"), "taxonID");
        assert_eq!(clean_header("dwc:taxonRank"), "taxonRank");
        assert_eq!(clean_header("http://rs.tdwg.org/dwc/terms/kingdom"), "kingdom");
    }
}
