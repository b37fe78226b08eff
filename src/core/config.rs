//! Build and matching configuration

use crate::{BackboneError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

/// How an unranked instance gets a rank when no ranked name is available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RankInference {
    /// Rank implied by the shape of the name, then the accepted instance's rank
    NameAnalysis,
    /// Rank of the resolved accepted instance
    AcceptedRank,
    /// Most common rank among the other children of the resolved parent
    SiblingMajority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    /// Principals must score above this
    #[serde(default = "default_accepted_cutoff")]
    pub accepted_cutoff: i32,
    /// Hop limit for resolution chains and resolution rounds
    #[serde(default = "default_max_resolution_steps")]
    pub max_resolution_steps: usize,
    #[serde(default = "default_unknown_taxon_id")]
    pub unknown_taxon_id: String,
    /// Provider used for synthesized instances
    #[serde(default = "default_inference_provider")]
    pub inference_provider: String,
    #[serde(default = "default_rank_inference")]
    pub rank_inference: RankInference,
    /// Identifier of the taxon parentless instances hang from, if any
    #[serde(default)]
    pub default_parent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_fuzzy")]
    pub fuzzy: bool,
    #[serde(default = "default_max_edit_distance")]
    pub max_edit_distance: usize,
    #[serde(default = "default_max_length_difference")]
    pub max_length_difference: usize,
    /// Bound on classification relaxation steps
    #[serde(default = "default_max_relaxation_depth")]
    pub max_relaxation_depth: usize,
    /// Author similarity below which a homonym is checked against the classification
    #[serde(default = "default_author_similarity")]
    pub author_similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_write_metadata")]
    pub write_metadata: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Worker threads (0 = all available)
    #[serde(default)]
    pub threads: usize,
    #[serde(default = "default_progress")]
    pub progress: bool,
}

// Default value functions
fn default_accepted_cutoff() -> i32 { 0 }
fn default_max_resolution_steps() -> usize { 40 }
fn default_unknown_taxon_id() -> String { "ALA_The_Unknown_Taxon".to_string() }
fn default_inference_provider() -> String { "inferred".to_string() }
fn default_rank_inference() -> RankInference { RankInference::NameAnalysis }
fn default_fuzzy() -> bool { true }
fn default_max_edit_distance() -> usize { 2 }
fn default_max_length_difference() -> usize { 2 }
fn default_max_relaxation_depth() -> usize { 8 }
fn default_author_similarity() -> f64 { 0.8 }
fn default_delimiter() -> char { ',' }
fn default_write_metadata() -> bool { true }
fn default_progress() -> bool { true }

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            accepted_cutoff: default_accepted_cutoff(),
            max_resolution_steps: default_max_resolution_steps(),
            unknown_taxon_id: default_unknown_taxon_id(),
            inference_provider: default_inference_provider(),
            rank_inference: default_rank_inference(),
            default_parent: None,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy: default_fuzzy(),
            max_edit_distance: default_max_edit_distance(),
            max_length_difference: default_max_length_difference(),
            max_relaxation_depth: default_max_relaxation_depth(),
            author_similarity: default_author_similarity(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            write_metadata: default_write_metadata(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            progress: default_progress(),
        }
    }
}

pub fn default_config() -> Config {
    Config::default()
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| BackboneError::Config(format!("Failed to parse config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<()> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| BackboneError::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, contents)?;
    Ok(())
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.taxonomy.max_resolution_steps == 0 {
            return Err(BackboneError::Config(
                "max_resolution_steps must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.matching.author_similarity) {
            return Err(BackboneError::Config(format!(
                "author_similarity must be within 0..1, got {}",
                self.matching.author_similarity
            )));
        }
        if self.taxonomy.unknown_taxon_id.trim().is_empty() {
            return Err(BackboneError::Config(
                "unknown_taxon_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.taxonomy.accepted_cutoff, 0);
        assert_eq!(config.taxonomy.max_resolution_steps, 40);
        assert_eq!(config.taxonomy.unknown_taxon_id, "ALA_The_Unknown_Taxon");
        assert_eq!(config.taxonomy.rank_inference, RankInference::NameAnalysis);
        assert!(config.taxonomy.default_parent.is_none());

        assert!(config.matching.fuzzy);
        assert_eq!(config.matching.max_edit_distance, 2);
        assert_eq!(config.matching.max_relaxation_depth, 8);

        assert_eq!(config.output.delimiter, ',');
        assert!(config.output.write_metadata);
        assert_eq!(config.performance.threads, 0);
    }

    #[test]
    fn test_load_partial_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[taxonomy]
accepted_cutoff = 50
rank_inference = "siblingMajority"

[matching]
fuzzy = false
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.taxonomy.accepted_cutoff, 50);
        assert_eq!(config.taxonomy.rank_inference, RankInference::SiblingMajority);
        assert_eq!(config.taxonomy.max_resolution_steps, 40);
        assert!(!config.matching.fuzzy);
        assert_eq!(config.matching.max_edit_distance, 2);
    }

    #[test]
    fn test_invalid_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[taxonomy]\nmax_resolution_steps = 0\n").unwrap();
        match load_config(file.path()) {
            Err(BackboneError::Config(msg)) => assert!(msg.contains("max_resolution_steps")),
            other => panic!("Expected Config error, got {:?}", other),
        }

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[taxonomy\n").unwrap();
        assert!(matches!(load_config(file.path()), Err(BackboneError::Config(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.taxonomy.default_parent = Some("ROOT".to_string());
        save_config(file.path(), &config).unwrap();

        let reloaded = load_config(file.path()).unwrap();
        assert_eq!(reloaded.taxonomy.default_parent.as_deref(), Some("ROOT"));
        assert_eq!(reloaded.output.delimiter, ',');
    }
}
