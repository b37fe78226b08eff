pub mod bio;
pub mod cli;
pub mod core;
pub mod index;
pub mod taxonomy;

pub use crate::bio::names::{AnalysedName, NameAnalyser};
pub use crate::core::config::Config;
pub use crate::index::{searcher::Searcher, NameIndex};
pub use crate::taxonomy::Taxonomy;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackboneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Schema error in {source_name}: missing required columns {missing:?}")]
    Schema {
        source_name: String,
        missing: Vec<String>,
    },

    #[error("Structural error at {taxon_id}: {message}")]
    Structural { taxon_id: String, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Operation {operation} is not valid in state {state}")]
    State {
        operation: &'static str,
        state: String,
    },

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for BackboneError {
    fn from(err: serde_json::Error) -> Self {
        BackboneError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackboneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BackboneError::Config("bad regex".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: bad regex");

        let err = BackboneError::Schema {
            source_name: "ausfungi.csv".to_string(),
            missing: vec!["taxonRank".to_string()],
        };
        assert!(err.to_string().contains("ausfungi.csv"));
        assert!(err.to_string().contains("taxonRank"));

        let err = BackboneError::Structural {
            taxon_id: "T-1".to_string(),
            message: "parent chain exceeds 40 steps".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Structural error at T-1: parent chain exceeds 40 steps"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BackboneError = io_err.into();
        match err {
            BackboneError::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: BackboneError = json_err.into();
        match err {
            BackboneError::Serialization(_) => {}
            _ => panic!("Expected Serialization error"),
        }
    }
}
