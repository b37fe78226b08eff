use crate::bio::rank::{NameType, NomenclaturalCode, TaxonomicRank};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Comparable key for a scientific name.
///
/// Equality, hashing and ordering use the code, the upper-case name, the rank and
/// the normalised author, in that order. The name type travels with the key but
/// does not distinguish two keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameKey {
    pub code: Option<NomenclaturalCode>,
    pub scientific_name: String,
    pub authorship: Option<String>,
    pub rank: TaxonomicRank,
    pub name_type: NameType,
}

impl NameKey {
    pub fn new(
        code: Option<NomenclaturalCode>,
        scientific_name: impl Into<String>,
        authorship: Option<String>,
        rank: TaxonomicRank,
        name_type: NameType,
    ) -> Self {
        Self {
            code,
            scientific_name: scientific_name.into(),
            authorship: authorship.filter(|a| !a.is_empty()),
            rank,
            name_type,
        }
    }

    /// Same key without the author
    pub fn to_name_key(&self) -> NameKey {
        NameKey {
            authorship: None,
            ..self.clone()
        }
    }

    /// Same key without author or rank
    pub fn to_unranked_key(&self) -> NameKey {
        NameKey {
            authorship: None,
            rank: TaxonomicRank::Unranked,
            ..self.clone()
        }
    }

    /// Same key without the nomenclatural code
    pub fn to_uncoded_key(&self) -> NameKey {
        NameKey {
            code: None,
            ..self.clone()
        }
    }

    pub fn is_formal(&self) -> bool {
        self.code.is_some() && self.name_type.is_formal()
    }

    pub fn is_unranked(&self) -> bool {
        self.rank.is_unranked()
    }

    pub fn is_unauthored(&self) -> bool {
        self.authorship.is_none()
    }

    /// Copy with the code filled in when absent
    pub fn with_default_code(mut self, code: Option<NomenclaturalCode>) -> Self {
        if self.code.is_none() {
            self.code = code;
        }
        self
    }
}

impl PartialEq for NameKey {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
            && self.scientific_name == other.scientific_name
            && self.rank == other.rank
            && self.authorship == other.authorship
    }
}

impl Eq for NameKey {}

impl Hash for NameKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code.hash(state);
        self.scientific_name.hash(state);
        self.rank.hash(state);
        self.authorship.hash(state);
    }
}

impl Ord for NameKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.code
            .cmp(&other.code)
            .then_with(|| self.scientific_name.cmp(&other.scientific_name))
            .then_with(|| self.rank.cmp(&other.rank))
            .then_with(|| self.authorship.cmp(&other.authorship))
    }
}

impl PartialOrd for NameKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code.map(|c| c.acronym()).unwrap_or("-");
        write!(f, "{}:{}", code, self.scientific_name)?;
        if let Some(author) = &self.authorship {
            write!(f, ":{}", author)?;
        }
        write!(f, ":{}", self.rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn key(name: &str, author: Option<&str>, rank: TaxonomicRank) -> NameKey {
        NameKey::new(
            Some(NomenclaturalCode::Botanical),
            name,
            author.map(str::to_string),
            rank,
            NameType::Scientific,
        )
    }

    #[test]
    fn test_equality_ignores_name_type() {
        let a = key("ACACIA DEALBATA", Some("Link"), TaxonomicRank::Species);
        let mut b = a.clone();
        b.name_type = NameType::Informal;
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_views() {
        let a = key("ACACIA DEALBATA", Some("Link"), TaxonomicRank::Species);
        assert!(a.to_name_key().is_unauthored());
        assert!(a.to_unranked_key().is_unranked());
        assert_eq!(a.to_uncoded_key().code, None);
        assert!(a.is_formal());
        assert!(!a.to_uncoded_key().is_formal());
    }

    #[test]
    fn test_empty_author_is_none() {
        let a = key("ACACIA", Some(""), TaxonomicRank::Genus);
        assert!(a.is_unauthored());
    }

    #[test]
    fn test_ordering() {
        let a = key("ACACIA", None, TaxonomicRank::Genus);
        let b = key("ACACIA DEALBATA", None, TaxonomicRank::Species);
        let c = key("ACACIA DEALBATA", Some("Link"), TaxonomicRank::Species);
        let mut keys = vec![c.clone(), b.clone(), a.clone()];
        keys.sort();
        assert_eq!(keys, vec![a, b, c]);
    }
}
