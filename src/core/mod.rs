pub mod concept;
pub mod config;
pub mod instance;
pub mod provider;
pub mod resolver;
pub mod rules;

pub use config::Config;
pub use instance::{Classification, TaxonConceptInstance};
pub use provider::{NameProvider, ProviderRegistry};
