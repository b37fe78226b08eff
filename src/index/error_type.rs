use serde::{Deserialize, Serialize};
use std::fmt;

/// A classification of the query's ambiguity or informality, reported alongside a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    SpeciesPlural,
    IndeterminateSpecies,
    QuestionSpecies,
    AffinitySpecies,
    ConferSpecies,
    Homonym,
    Generic,
    ParentChildSynonym,
    Excluded,
    AssociatedExcluded,
    MatchMisapplied,
    Misapplied,
    None,
}

impl ErrorType {
    pub fn title(&self) -> &'static str {
        match self {
            ErrorType::SpeciesPlural => "speciesPlural",
            ErrorType::IndeterminateSpecies => "indeterminateSpecies",
            ErrorType::QuestionSpecies => "questionSpecies",
            ErrorType::AffinitySpecies => "affinitySpecies",
            ErrorType::ConferSpecies => "conferSpecies",
            ErrorType::Homonym => "homonym",
            ErrorType::Generic => "genericError",
            ErrorType::ParentChildSynonym => "parentChildSynonym",
            ErrorType::Excluded => "excludedSpecies",
            ErrorType::AssociatedExcluded => "associatedNameExcluded",
            ErrorType::MatchMisapplied => "matchedToMisappliedName",
            ErrorType::Misapplied => "misappliedName",
            ErrorType::None => "noIssue",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorType::SpeciesPlural => "An spp. marker was identified",
            ErrorType::IndeterminateSpecies => {
                "An indeterminate marker was detected and an exact match could not be found"
            }
            ErrorType::QuestionSpecies => "A low confidence identification was made using a ? indicator",
            ErrorType::AffinitySpecies => "An aff. marker was detected in the original scientific name",
            ErrorType::ConferSpecies => "A cf. marker was detected in the original scientific name",
            ErrorType::Homonym => "A homonym was detected",
            ErrorType::Generic => "The name could not be searched",
            ErrorType::ParentChildSynonym => "The parent name is a synonym of its own child",
            ErrorType::Excluded => "The name is excluded from the backbone",
            ErrorType::AssociatedExcluded => "One of two equal names is excluded and the other is not",
            ErrorType::MatchMisapplied => {
                "The name has been misapplied to another concept in the past"
            }
            ErrorType::Misapplied => {
                "The name has been misapplied and does not exist as an accepted concept"
            }
            ErrorType::None => "No issue was detected",
        }
    }

    pub fn from_title(title: &str) -> Option<Self> {
        ALL.iter().copied().find(|e| e.title().eq_ignore_ascii_case(title))
    }
}

const ALL: [ErrorType; 13] = [
    ErrorType::SpeciesPlural,
    ErrorType::IndeterminateSpecies,
    ErrorType::QuestionSpecies,
    ErrorType::AffinitySpecies,
    ErrorType::ConferSpecies,
    ErrorType::Homonym,
    ErrorType::Generic,
    ErrorType::ParentChildSynonym,
    ErrorType::Excluded,
    ErrorType::AssociatedExcluded,
    ErrorType::MatchMisapplied,
    ErrorType::Misapplied,
    ErrorType::None,
];

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// How a match was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    Exact,
    Canonical,
    Phrase,
    Fuzzy,
    /// Matched on a higher rank of the supplied classification
    Recursive,
    TaxonId,
}

impl MatchType {
    pub fn title(&self) -> &'static str {
        match self {
            MatchType::Exact => "exactMatch",
            MatchType::Canonical => "canonicalMatch",
            MatchType::Phrase => "phraseMatch",
            MatchType::Fuzzy => "fuzzyMatch",
            MatchType::Recursive => "higherMatch",
            MatchType::TaxonId => "taxonIdMatch",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_titles() {
        assert_eq!(ErrorType::Homonym.to_string(), "homonym");
        assert_eq!(ErrorType::from_title("AFFINITYSPECIES"), Some(ErrorType::AffinitySpecies));
        assert_eq!(ErrorType::from_title("nope"), None);
        assert_eq!(MatchType::Recursive.to_string(), "higherMatch");
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ErrorType::ParentChildSynonym).unwrap();
        assert_eq!(json, "\"PARENT_CHILD_SYNONYM\"");
        let json = serde_json::to_string(&MatchType::TaxonId).unwrap();
        assert_eq!(json, "\"taxonId\"");
    }
}
