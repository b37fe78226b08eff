pub mod name_key;
pub mod names;
pub mod rank;

pub use name_key::NameKey;
pub use names::{AnalysedName, NameAnalyser, NameMarker};
pub use rank::{NameType, NomenclaturalCode, TaxonomicGroup, TaxonomicRank, TaxonomicStatus};
