//! Ranks, statuses, codes and name types shared by the builder and the matcher
use serde::{Deserialize, Serialize};
use std::fmt;

/// Taxonomic ranks in hierarchy order, with the numeric ids used for rank distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxonomicRank {
    Domain,
    Kingdom,
    Subkingdom,
    Phylum,
    Subphylum,
    Class,
    Subclass,
    Order,
    Suborder,
    Superfamily,
    Family,
    Subfamily,
    Tribe,
    Genus,
    Subgenus,
    Section,
    Species,
    Subspecies,
    Variety,
    Form,
    Cultivar,
    Unranked,
}

impl TaxonomicRank {
    pub const ALL: [TaxonomicRank; 22] = [
        Self::Domain,
        Self::Kingdom,
        Self::Subkingdom,
        Self::Phylum,
        Self::Subphylum,
        Self::Class,
        Self::Subclass,
        Self::Order,
        Self::Suborder,
        Self::Superfamily,
        Self::Family,
        Self::Subfamily,
        Self::Tribe,
        Self::Genus,
        Self::Subgenus,
        Self::Section,
        Self::Species,
        Self::Subspecies,
        Self::Variety,
        Self::Form,
        Self::Cultivar,
        Self::Unranked,
    ];

    /// The principal ranks a classification carries, root first
    pub const LINNAEAN: [TaxonomicRank; 7] = [
        Self::Kingdom,
        Self::Phylum,
        Self::Class,
        Self::Order,
        Self::Family,
        Self::Genus,
        Self::Species,
    ];

    /// Parse a rank label. Accepts common abbreviations and is case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        let label = s.trim().trim_end_matches('.').to_lowercase();
        let rank = match label.as_str() {
            "domain" | "superkingdom" => Self::Domain,
            "kingdom" | "regnum" => Self::Kingdom,
            "subkingdom" => Self::Subkingdom,
            "phylum" | "division" | "division botany" => Self::Phylum,
            "subphylum" | "subdivision" => Self::Subphylum,
            "class" | "classis" => Self::Class,
            "subclass" => Self::Subclass,
            "order" | "ordo" => Self::Order,
            "suborder" => Self::Suborder,
            "superfamily" => Self::Superfamily,
            "family" | "familia" => Self::Family,
            "subfamily" => Self::Subfamily,
            "tribe" => Self::Tribe,
            "genus" => Self::Genus,
            "subgenus" | "subgen" => Self::Subgenus,
            "section" | "sect" => Self::Section,
            "species" | "sp" => Self::Species,
            "subspecies" | "subsp" | "ssp" => Self::Subspecies,
            "variety" | "var" | "varietas" => Self::Variety,
            "form" | "forma" | "f" => Self::Form,
            "cultivar" | "cv" => Self::Cultivar,
            "unranked" | "" | "no rank" | "norank" | "other" => Self::Unranked,
            _ => return None,
        };
        Some(rank)
    }

    /// Numeric rank id; lower is higher in the hierarchy
    pub fn id(&self) -> u32 {
        match self {
            Self::Domain => 800,
            Self::Kingdom => 1000,
            Self::Subkingdom => 1200,
            Self::Phylum => 2000,
            Self::Subphylum => 2200,
            Self::Class => 3000,
            Self::Subclass => 3200,
            Self::Order => 4000,
            Self::Suborder => 4200,
            Self::Superfamily => 4500,
            Self::Family => 5000,
            Self::Subfamily => 5500,
            Self::Tribe => 5600,
            Self::Genus => 6000,
            Self::Subgenus => 6500,
            Self::Section => 6600,
            Self::Species => 7000,
            Self::Subspecies => 8000,
            Self::Variety => 8010,
            Self::Form => 8020,
            Self::Cultivar => 8050,
            Self::Unranked => 9999,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Kingdom => "kingdom",
            Self::Subkingdom => "subkingdom",
            Self::Phylum => "phylum",
            Self::Subphylum => "subphylum",
            Self::Class => "class",
            Self::Subclass => "subclass",
            Self::Order => "order",
            Self::Suborder => "suborder",
            Self::Superfamily => "superfamily",
            Self::Family => "family",
            Self::Subfamily => "subfamily",
            Self::Tribe => "tribe",
            Self::Genus => "genus",
            Self::Subgenus => "subgenus",
            Self::Section => "section",
            Self::Species => "species",
            Self::Subspecies => "subspecies",
            Self::Variety => "variety",
            Self::Form => "form",
            Self::Cultivar => "cultivar",
            Self::Unranked => "unranked",
        }
    }

    pub fn is_unranked(&self) -> bool {
        *self == Self::Unranked
    }

    pub fn is_linnaean(&self) -> bool {
        Self::LINNAEAN.contains(self)
    }

    /// Ranks below species
    pub fn is_infraspecific(&self) -> bool {
        !self.is_unranked() && self.id() > Self::Species.id()
    }

    /// True for ranks strictly above `other` in the hierarchy
    pub fn is_higher_than(&self, other: TaxonomicRank) -> bool {
        self.id() < other.id()
    }
}

impl Default for TaxonomicRank {
    fn default() -> Self {
        Self::Unranked
    }
}

impl fmt::Display for TaxonomicRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Broad grouping of taxonomic statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaxonomicGroup {
    Accepted,
    Synonym,
    Misapplied,
    Excluded,
    IncertaeSedis,
    Unplaced,
    Invalid,
    Doubtful,
    Miscellaneous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaxonomicStatus {
    Accepted,
    InferredAccepted,
    Synonym,
    HomotypicSynonym,
    ObjectiveSynonym,
    HeterotypicSynonym,
    SubjectiveSynonym,
    ProParteSynonym,
    Misapplied,
    InferredSynonym,
    Excluded,
    IncertaeSedis,
    SpeciesInquirenda,
    Unplaced,
    InferredUnplaced,
    Invalid,
    InferredInvalid,
    Doubtful,
    MiscellaneousLiterature,
}

impl TaxonomicStatus {
    pub fn parse(s: &str) -> Option<Self> {
        let label: String = s
            .trim()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        let status = match label.as_str() {
            "accepted" | "valid" => Self::Accepted,
            "inferredaccepted" => Self::InferredAccepted,
            "synonym" | "nomenclaturalsynonym" | "taxonomicsynonym" => Self::Synonym,
            "homotypicsynonym" => Self::HomotypicSynonym,
            "objectivesynonym" => Self::ObjectiveSynonym,
            "heterotypicsynonym" => Self::HeterotypicSynonym,
            "subjectivesynonym" => Self::SubjectiveSynonym,
            "propartesynonym" => Self::ProParteSynonym,
            "misapplied" | "misappliedname" => Self::Misapplied,
            "inferredsynonym" => Self::InferredSynonym,
            "excluded" => Self::Excluded,
            "incertaesedis" => Self::IncertaeSedis,
            "speciesinquirenda" => Self::SpeciesInquirenda,
            "unplaced" | "unknown" => Self::Unplaced,
            "inferredunplaced" => Self::InferredUnplaced,
            "invalid" => Self::Invalid,
            "inferredinvalid" => Self::InferredInvalid,
            "doubtful" => Self::Doubtful,
            "miscellaneousliterature" => Self::MiscellaneousLiterature,
            _ => return None,
        };
        Some(status)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::InferredAccepted => "inferredAccepted",
            Self::Synonym => "synonym",
            Self::HomotypicSynonym => "homotypicSynonym",
            Self::ObjectiveSynonym => "objectiveSynonym",
            Self::HeterotypicSynonym => "heterotypicSynonym",
            Self::SubjectiveSynonym => "subjectiveSynonym",
            Self::ProParteSynonym => "proParteSynonym",
            Self::Misapplied => "misapplied",
            Self::InferredSynonym => "inferredSynonym",
            Self::Excluded => "excluded",
            Self::IncertaeSedis => "incertaeSedis",
            Self::SpeciesInquirenda => "speciesInquirenda",
            Self::Unplaced => "unplaced",
            Self::InferredUnplaced => "inferredUnplaced",
            Self::Invalid => "invalid",
            Self::InferredInvalid => "inferredInvalid",
            Self::Doubtful => "doubtful",
            Self::MiscellaneousLiterature => "miscellaneousLiterature",
        }
    }

    pub fn group(&self) -> TaxonomicGroup {
        match self {
            Self::Accepted | Self::InferredAccepted => TaxonomicGroup::Accepted,
            Self::Synonym
            | Self::HomotypicSynonym
            | Self::ObjectiveSynonym
            | Self::HeterotypicSynonym
            | Self::SubjectiveSynonym
            | Self::ProParteSynonym
            | Self::InferredSynonym => TaxonomicGroup::Synonym,
            Self::Misapplied => TaxonomicGroup::Misapplied,
            Self::Excluded => TaxonomicGroup::Excluded,
            Self::IncertaeSedis | Self::SpeciesInquirenda => TaxonomicGroup::IncertaeSedis,
            Self::Unplaced | Self::InferredUnplaced => TaxonomicGroup::Unplaced,
            Self::Invalid | Self::InferredInvalid => TaxonomicGroup::Invalid,
            Self::Doubtful => TaxonomicGroup::Doubtful,
            Self::MiscellaneousLiterature => TaxonomicGroup::Miscellaneous,
        }
    }

    /// Accepted or proper synonym; the statuses that can be principals
    pub fn is_primary(&self) -> bool {
        matches!(
            self.group(),
            TaxonomicGroup::Accepted | TaxonomicGroup::Synonym
        )
    }

    pub fn is_accepted(&self) -> bool {
        matches!(
            self.group(),
            TaxonomicGroup::Accepted | TaxonomicGroup::IncertaeSedis
        )
    }

    /// Anything that points at an accepted name, misapplications included
    pub fn is_synonym(&self) -> bool {
        matches!(
            self.group(),
            TaxonomicGroup::Synonym | TaxonomicGroup::Misapplied
        )
    }

    pub fn is_unplaced(&self) -> bool {
        matches!(
            self.group(),
            TaxonomicGroup::IncertaeSedis | TaxonomicGroup::Unplaced
        )
    }

    pub fn is_excluded(&self) -> bool {
        *self == Self::Excluded
    }

    pub fn is_misapplied(&self) -> bool {
        *self == Self::Misapplied
    }
}

impl fmt::Display for TaxonomicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NomenclaturalCode {
    Zoological,
    Botanical,
    Bacterial,
    Virus,
    Cultivars,
}

impl NomenclaturalCode {
    pub fn parse(s: &str) -> Option<Self> {
        let code = match s.trim().to_uppercase().as_str() {
            "ICZN" | "ZOOLOGICAL" | "ZOOLOGY" => Self::Zoological,
            "ICN" | "ICBN" | "ICNAFP" | "BOTANICAL" | "BOTANY" => Self::Botanical,
            "ICNP" | "ICNB" | "ICSP" | "BACTERIAL" | "BACTERIOLOGICAL" => Self::Bacterial,
            "ICTV" | "ICVCN" | "VIRUS" | "VIRAL" => Self::Virus,
            "ICNCP" | "CULTIVARS" | "CULTIVATED" => Self::Cultivars,
            _ => return None,
        };
        Some(code)
    }

    pub fn acronym(&self) -> &'static str {
        match self {
            Self::Zoological => "ICZN",
            Self::Botanical => "ICN",
            Self::Bacterial => "ICNP",
            Self::Virus => "ICTV",
            Self::Cultivars => "ICNCP",
        }
    }
}

impl fmt::Display for NomenclaturalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.acronym())
    }
}

/// The shape of a name as found by the normalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NameType {
    Scientific,
    Informal,
    Doubtful,
    Cultivar,
    Hybrid,
    Placeholder,
    NoName,
    Virus,
}

impl NameType {
    pub fn parse(s: &str) -> Option<Self> {
        let name_type = match s.trim().to_lowercase().as_str() {
            "scientific" => Self::Scientific,
            "informal" | "phrase" => Self::Informal,
            "doubtful" => Self::Doubtful,
            "cultivar" => Self::Cultivar,
            "hybrid" => Self::Hybrid,
            "placeholder" => Self::Placeholder,
            "noname" | "no_name" => Self::NoName,
            "virus" => Self::Virus,
            _ => return None,
        };
        Some(name_type)
    }

    pub fn is_formal(&self) -> bool {
        matches!(
            self,
            Self::Scientific | Self::Hybrid | Self::Cultivar | Self::Virus
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Scientific => "scientific",
            Self::Informal => "informal",
            Self::Doubtful => "doubtful",
            Self::Cultivar => "cultivar",
            Self::Hybrid => "hybrid",
            Self::Placeholder => "placeholder",
            Self::NoName => "noName",
            Self::Virus => "virus",
        }
    }
}

impl fmt::Display for NameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Species", TaxonomicRank::Species)]
    #[case("subsp.", TaxonomicRank::Subspecies)]
    #[case("ssp", TaxonomicRank::Subspecies)]
    #[case("var.", TaxonomicRank::Variety)]
    #[case("Division", TaxonomicRank::Phylum)]
    #[case("forma", TaxonomicRank::Form)]
    #[case("", TaxonomicRank::Unranked)]
    fn test_rank_parse(#[case] label: &str, #[case] expected: TaxonomicRank) {
        assert_eq!(TaxonomicRank::parse(label), Some(expected));
    }

    #[test]
    fn test_rank_unknown_label() {
        assert_eq!(TaxonomicRank::parse("supercohort"), None);
    }

    #[test]
    fn test_rank_order_matches_ids() {
        for pair in TaxonomicRank::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].id() < pair[1].id());
        }
        assert!(TaxonomicRank::Genus.is_higher_than(TaxonomicRank::Species));
        assert!(TaxonomicRank::Variety.is_infraspecific());
        assert!(!TaxonomicRank::Unranked.is_infraspecific());
    }

    #[test]
    fn test_status_flags() {
        assert!(TaxonomicStatus::Accepted.is_primary());
        assert!(TaxonomicStatus::HeterotypicSynonym.is_primary());
        assert!(!TaxonomicStatus::Misapplied.is_primary());
        assert!(TaxonomicStatus::Misapplied.is_synonym());
        assert!(TaxonomicStatus::IncertaeSedis.is_accepted());
        assert!(TaxonomicStatus::InferredUnplaced.is_unplaced());
        assert_eq!(
            TaxonomicStatus::parse("Pro parte synonym"),
            Some(TaxonomicStatus::ProParteSynonym)
        );
        assert_eq!(TaxonomicStatus::parse("whatever"), None);
    }

    #[test]
    fn test_status_serde_labels() {
        let json = serde_json::to_string(&TaxonomicStatus::InferredAccepted).unwrap();
        assert_eq!(json, "\"inferredAccepted\"");
        let status: TaxonomicStatus = serde_json::from_str("\"proParteSynonym\"").unwrap();
        assert_eq!(status, TaxonomicStatus::ProParteSynonym);
    }

    #[test]
    fn test_code_parse() {
        assert_eq!(NomenclaturalCode::parse("ICBN"), Some(NomenclaturalCode::Botanical));
        assert_eq!(NomenclaturalCode::parse("iczn"), Some(NomenclaturalCode::Zoological));
        assert_eq!(NomenclaturalCode::parse("ICTV"), Some(NomenclaturalCode::Virus));
        assert_eq!(NomenclaturalCode::parse("ICXX"), None);
    }

    #[test]
    fn test_name_type_formal() {
        assert!(NameType::Scientific.is_formal());
        assert!(NameType::Cultivar.is_formal());
        assert!(!NameType::Informal.is_formal());
        assert!(!NameType::Placeholder.is_formal());
    }
}
