//! Common test utilities for backbone integration tests
//!
//! Fixtures are written to a temporary directory so the tests go through the
//! same file-based entry points as the command line.
use backbone::core::ProviderRegistry;
use backbone::taxonomy::Source;
use backbone::{Config, Taxonomy};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const HEADER: &str = "taxonID,scientificName,scientificNameAuthorship,taxonomicStatus,taxonRank,parentNameUsageID,acceptedNameUsageID,nomenclaturalCode,kingdom,family";

/// Test environment that manages temporary directories and cleanup
pub struct TestEnvironment {
    _temp_dir: TempDir,
    pub root: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        TestEnvironment {
            _temp_dir: temp_dir,
            root,
        }
    }

    /// Get a path within the test environment
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create fixture dir");
        }
        std::fs::write(&path, contents).expect("Failed to write fixture");
        path
    }

    pub fn write_providers(&self, json: &str) -> PathBuf {
        self.write("providers.json", json)
    }

    /// Write a source CSV with the standard header and return it as a `Source`
    pub fn write_source(&self, provider: &str, name: &str, rows: &[&str]) -> Source {
        let contents = format!("{}\n{}\n", HEADER, rows.join("\n"));
        let path = self.write(&format!("sources/{}", name), &contents);
        Source::new(provider, path)
    }
}

pub fn quiet_config() -> Config {
    let mut config = Config::default();
    config.performance.progress = false;
    config
}

/// Load and resolve the given sources into a finalized taxonomy
pub fn build_taxonomy(providers: &Path, sources: &[Source]) -> Taxonomy {
    let registry = ProviderRegistry::load(providers).expect("Failed to load providers");
    let mut taxonomy = Taxonomy::new(quiet_config(), registry);
    taxonomy.load(sources).expect("Failed to load sources");
    taxonomy.resolve().expect("Failed to resolve taxonomy");
    taxonomy
}

/// Taxon identifiers of the representative instances, sorted
#[allow(dead_code)]
pub fn representative_ids(taxonomy: &Taxonomy) -> Vec<String> {
    let mut ids: Vec<String> = taxonomy
        .representatives()
        .into_iter()
        .map(|id| taxonomy.instance(id).taxon_id.clone())
        .collect();
    ids.sort();
    ids
}

/// A small plant and animal backbone from a single provider
#[allow(dead_code)]
pub fn sample_rows() -> Vec<&'static str> {
    vec![
        "P,Plantae,,accepted,kingdom,,,ICN,,",
        "A,Animalia,,accepted,kingdom,,,ICZN,,",
        "F1,Asteraceae,,accepted,family,P,,ICN,Plantae,",
        "F2,Fabaceae,,accepted,family,P,,ICN,Plantae,",
        "F3,Tenebrionidae,,accepted,family,A,,ICZN,Animalia,",
        "F4,Orchidaceae,,accepted,family,P,,ICN,Plantae,",
        "G1,Simsia,Pers.,accepted,genus,F1,,ICN,Plantae,Asteraceae",
        "G2,Simsia,Champion,accepted,genus,F3,,ICZN,Animalia,Tenebrionidae",
        "G3,Acacia,Mill.,accepted,genus,F2,,ICN,Plantae,Fabaceae",
        "S1,Acacia dealbata,Link,accepted,species,G3,,ICN,Plantae,Fabaceae",
        "Y1,Racosperma dealbatum,(Link) Pedley,synonym,species,,S1,ICN,Plantae,Fabaceae",
        "G4,Thelymitra,Sw.,accepted,genus,F4,,ICN,Plantae,Orchidaceae",
        "S3,Thelymitra pauciflora,R.Br.,accepted,species,G4,,ICN,Plantae,Orchidaceae",
    ]
}
