//! One provider's assertion about one taxon, stored in the taxonomy arena
use crate::bio::{NameKey, NomenclaturalCode, TaxonomicRank, TaxonomicStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Index of an instance in the taxonomy arena
pub type InstanceId = usize;

/// Index of a concept in the taxonomy's concept table
pub type ConceptId = usize;

/// Higher classification carried on a source record or a query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub kingdom: Option<String>,
    pub phylum: Option<String>,
    pub class: Option<String>,
    pub order: Option<String>,
    pub family: Option<String>,
    pub genus: Option<String>,
    pub specific_epithet: Option<String>,
    pub infraspecific_epithet: Option<String>,
}

impl Classification {
    /// Higher ranks, most specific first
    pub const HIGHER_RANKS: [TaxonomicRank; 6] = [
        TaxonomicRank::Genus,
        TaxonomicRank::Family,
        TaxonomicRank::Order,
        TaxonomicRank::Class,
        TaxonomicRank::Phylum,
        TaxonomicRank::Kingdom,
    ];

    pub fn get(&self, rank: TaxonomicRank) -> Option<&str> {
        let value = match rank {
            TaxonomicRank::Kingdom => &self.kingdom,
            TaxonomicRank::Phylum => &self.phylum,
            TaxonomicRank::Class => &self.class,
            TaxonomicRank::Order => &self.order,
            TaxonomicRank::Family => &self.family,
            TaxonomicRank::Genus => &self.genus,
            _ => return None,
        };
        value.as_deref().filter(|v| !v.trim().is_empty())
    }

    pub fn set(&mut self, rank: TaxonomicRank, value: Option<String>) {
        let value = value.filter(|v| !v.trim().is_empty());
        match rank {
            TaxonomicRank::Kingdom => self.kingdom = value,
            TaxonomicRank::Phylum => self.phylum = value,
            TaxonomicRank::Class => self.class = value,
            TaxonomicRank::Order => self.order = value,
            TaxonomicRank::Family => self.family = value,
            TaxonomicRank::Genus => self.genus = value,
            _ => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        Self::HIGHER_RANKS.iter().all(|r| self.get(*r).is_none())
            && self.specific_epithet.is_none()
            && self.infraspecific_epithet.is_none()
    }

    /// True when every rank populated in both classifications agrees, ignoring case,
    /// down to and including `level`
    pub fn agrees_with(&self, other: &Classification, level: TaxonomicRank) -> bool {
        Self::HIGHER_RANKS
            .iter()
            .filter(|r| !level.is_higher_than(**r))
            .all(|r| match (self.get(*r), other.get(*r)) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                _ => true,
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonConceptInstance {
    pub taxon_id: String,
    /// Provider index, in declaration order
    pub provider: usize,
    pub code: Option<NomenclaturalCode>,
    pub dataset_id: Option<String>,
    pub scientific_name: String,
    pub authorship: Option<String>,
    pub rank: TaxonomicRank,
    pub status: TaxonomicStatus,
    pub nomenclatural_status: BTreeSet<String>,
    pub year: Option<String>,
    pub parent_name_usage_id: Option<String>,
    pub accepted_name_usage_id: Option<String>,
    pub classification: Classification,
    pub remarks: Vec<String>,

    /// Grouping key after provider key adjustments
    pub key: NameKey,
    /// Rank implied by the shape of the name
    pub implied_rank: Option<TaxonomicRank>,

    pub parent: Option<InstanceId>,
    pub accepted: Option<InstanceId>,

    pub base_score: Option<i32>,
    pub score: Option<i32>,
    /// Explanation of the forbidding condition, if any
    pub forbidden: Option<String>,

    pub concept: Option<ConceptId>,
    pub resolved: Option<InstanceId>,
    pub resolved_accepted: Option<InstanceId>,
    pub resolved_parent: Option<InstanceId>,
}

impl TaxonConceptInstance {
    pub fn new(
        taxon_id: impl Into<String>,
        provider: usize,
        scientific_name: impl Into<String>,
        status: TaxonomicStatus,
        key: NameKey,
    ) -> Self {
        Self {
            taxon_id: taxon_id.into(),
            provider,
            code: key.code,
            dataset_id: None,
            scientific_name: scientific_name.into(),
            authorship: None,
            rank: key.rank,
            status,
            nomenclatural_status: BTreeSet::new(),
            year: None,
            parent_name_usage_id: None,
            accepted_name_usage_id: None,
            classification: Classification::default(),
            remarks: Vec::new(),
            key,
            implied_rank: None,
            parent: None,
            accepted: None,
            base_score: None,
            score: None,
            forbidden: None,
            concept: None,
            resolved: None,
            resolved_accepted: None,
            resolved_parent: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status.is_accepted()
    }

    pub fn is_synonym(&self) -> bool {
        self.status.is_synonym()
    }

    pub fn is_primary(&self) -> bool {
        self.status.is_primary()
    }

    pub fn is_forbidden(&self) -> bool {
        self.forbidden.is_some()
    }

    pub fn score(&self) -> i32 {
        self.score.unwrap_or(0)
    }

    /// Record a provenance note
    pub fn note(&mut self, remark: impl Into<String>) {
        self.remarks.push(remark.into());
    }

    /// Display label used in issues and logs
    pub fn label(&self) -> String {
        match &self.authorship {
            Some(author) => format!("{} {} [{}]", self.scientific_name, author, self.taxon_id),
            None => format!("{} [{}]", self.scientific_name, self.taxon_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::NameType;

    #[test]
    fn test_classification_access() {
        let mut cl = Classification::default();
        assert!(cl.is_empty());
        cl.set(TaxonomicRank::Kingdom, Some("Plantae".to_string()));
        cl.set(TaxonomicRank::Genus, Some("  ".to_string()));
        assert_eq!(cl.get(TaxonomicRank::Kingdom), Some("Plantae"));
        assert_eq!(cl.get(TaxonomicRank::Genus), None);
        assert_eq!(cl.get(TaxonomicRank::Species), None);
        assert!(!cl.is_empty());
    }

    #[test]
    fn test_classification_agreement() {
        let mut a = Classification::default();
        a.kingdom = Some("Plantae".to_string());
        a.family = Some("Asteraceae".to_string());
        let mut b = Classification::default();
        b.kingdom = Some("plantae".to_string());
        b.family = Some("Fabaceae".to_string());

        assert!(a.agrees_with(&b, TaxonomicRank::Kingdom));
        assert!(a.agrees_with(&b, TaxonomicRank::Order));
        assert!(!a.agrees_with(&b, TaxonomicRank::Family));
    }

    #[test]
    fn test_instance_flags() {
        let key = NameKey::new(
            Some(NomenclaturalCode::Botanical),
            "ACACIA",
            None,
            TaxonomicRank::Genus,
            NameType::Scientific,
        );
        let mut instance =
            TaxonConceptInstance::new("T1", 0, "Acacia", TaxonomicStatus::Accepted, key);
        assert!(instance.is_accepted());
        assert!(instance.is_primary());
        assert!(!instance.is_forbidden());
        assert_eq!(instance.rank, TaxonomicRank::Genus);
        instance.forbidden = Some("scientificName:Acacia".to_string());
        assert!(instance.is_forbidden());
        assert_eq!(instance.label(), "Acacia [T1]");
    }
}
