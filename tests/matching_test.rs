mod common;

use backbone::bio::TaxonomicRank;
use backbone::core::config::MatchingConfig;
use backbone::index::searcher::{MatchOutcome, PartialClassification};
use backbone::index::{ErrorType, MatchType};
use backbone::{NameIndex, Searcher};
use common::*;

/// Build, export and reload the sample backbone, then search the reloaded index
fn exported_searcher(env: &TestEnvironment) -> Searcher {
    let providers = env.write_providers(r#"[{"id": "apc", "defaultScore": 200}]"#);
    let source = env.write_source("apc", "apc.csv", &sample_rows());
    let taxonomy = build_taxonomy(&providers, &[source]);
    let out = env.path("backbone");
    taxonomy.create_output(&out).unwrap();
    Searcher::new(NameIndex::load(&out).unwrap(), MatchingConfig::default())
}

#[test]
fn test_exact_and_synonym_lookup() {
    let env = TestEnvironment::new();
    let searcher = exported_searcher(&env);

    let result = searcher.search_by_name("Acacia dealbata", None);
    assert_eq!(result.best().unwrap().taxon().taxon_id, "S1");
    assert_eq!(result.match_type, Some(MatchType::Exact));
    assert!(result.has_error(ErrorType::None));

    let result = searcher.search_by_name("Racosperma dealbatum", Some(TaxonomicRank::Species));
    let best = result.best().unwrap();
    assert_eq!(best.entry.taxon_id, "Y1");
    assert_eq!(best.taxon().taxon_id, "S1");
}

#[test]
fn test_homonym_without_context_is_ambiguous() {
    let env = TestEnvironment::new();
    let searcher = exported_searcher(&env);

    let result = searcher.search_by_name("Simsia", None);
    assert!(result.is_ambiguous());
    assert!(result.has_error(ErrorType::Homonym));
    match &result.outcome {
        MatchOutcome::Ambiguous(candidates) => assert_eq!(candidates.len(), 2),
        other => panic!("Expected ambiguous outcome, got {:?}", other),
    }
}

#[test]
fn test_homonym_with_context_is_unique() {
    let env = TestEnvironment::new();
    let searcher = exported_searcher(&env);

    let query = PartialClassification {
        scientific_name: Some("Simsia".to_string()),
        kingdom: Some("Animalia".to_string()),
        ..PartialClassification::default()
    };
    let result = searcher.search_by_classification(&query);
    assert_eq!(result.best().unwrap().taxon().taxon_id, "G2");
    assert!(!result.has_error(ErrorType::Homonym));
}

#[test]
fn test_affinity_name_matches_genus() {
    let env = TestEnvironment::new();
    let searcher = exported_searcher(&env);

    let query = PartialClassification {
        scientific_name: Some("Thelymitra aff. pauciflora".to_string()),
        family: Some("Orchidaceae".to_string()),
        ..PartialClassification::default()
    };
    let result = searcher.search_by_classification(&query);
    assert_eq!(result.best().unwrap().taxon().taxon_id, "G4");
    assert_eq!(result.match_type, Some(MatchType::Recursive));
    assert!(result.has_error(ErrorType::AffinitySpecies));
}

#[test]
fn test_batch_keeps_query_order() {
    let env = TestEnvironment::new();
    let searcher = exported_searcher(&env);

    let queries = vec![
        PartialClassification::from_name("Thelymitra pauciflora", None),
        PartialClassification::from_name("Nonexistus imaginarius", None),
        PartialClassification::from_name("Acacia", None),
    ];
    let results = searcher.search_batch(&queries);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].best().unwrap().taxon().taxon_id, "S3");
    assert!(!results[1].is_found());
    assert_eq!(results[2].best().unwrap().taxon().taxon_id, "G3");
}
