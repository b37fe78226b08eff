//! Name and concept groupings over the instance arena.

use crate::bio::{NameKey, TaxonomicRank};
use crate::core::instance::{ConceptId, InstanceId, TaxonConceptInstance};
use std::collections::HashMap;

/// All concepts sharing a code and key name, whatever their rank or author
#[derive(Debug, Clone)]
pub struct ScientificName {
    /// Unranked, unauthored key
    pub key: NameKey,
    pub concepts: Vec<ConceptId>,
}

impl ScientificName {
    pub fn new(key: NameKey) -> Self {
        Self {
            key,
            concepts: Vec::new(),
        }
    }
}

/// Instances judged to denote the same taxon: same name, rank and author
#[derive(Debug, Clone)]
pub struct TaxonConcept {
    pub key: NameKey,
    /// Index of the owning [`ScientificName`]
    pub name: usize,
    pub instances: Vec<InstanceId>,
    pub resolution: Option<TaxonResolution>,
    /// Set when this concept was folded into another
    pub merged_into: Option<ConceptId>,
}

impl TaxonConcept {
    pub fn new(key: NameKey, name: usize) -> Self {
        Self {
            key,
            name,
            instances: Vec::new(),
            resolution: None,
            merged_into: None,
        }
    }

    pub fn rank(&self) -> TaxonomicRank {
        self.key.rank
    }

    pub fn is_authored(&self) -> bool {
        !self.key.is_unauthored()
    }

    pub fn is_formal(&self) -> bool {
        self.key.is_formal()
    }

    pub fn is_active(&self) -> bool {
        self.merged_into.is_none() && !self.instances.is_empty()
    }

    /// True when some usable member is accepted
    pub fn has_accepted(&self, instances: &[TaxonConceptInstance]) -> bool {
        match &self.resolution {
            Some(resolution) => resolution
                .principals
                .iter()
                .any(|id| instances[*id].is_accepted()),
            None => self
                .instances
                .iter()
                .map(|id| &instances[*id])
                .any(|i| i.is_accepted() && !i.is_forbidden()),
        }
    }

    /// Highest member score
    pub fn top_score(&self, instances: &[TaxonConceptInstance]) -> i32 {
        self.instances
            .iter()
            .map(|id| instances[*id].score())
            .max()
            .unwrap_or(0)
    }
}

/// The outcome of resolving one concept
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonResolution {
    /// Instances from the winning provider, best first
    pub principals: Vec<InstanceId>,
    /// Instances that stand for something in the output
    pub used: Vec<InstanceId>,
    /// Each member mapped to the instance it resolves to
    pub resolved: HashMap<InstanceId, InstanceId>,
}

impl TaxonResolution {
    pub fn new(principals: Vec<InstanceId>) -> Self {
        Self {
            used: principals.clone(),
            principals,
            resolved: HashMap::new(),
        }
    }

    /// Map an instance onto a member of this concept, marking it used
    pub fn add_internal(&mut self, instance: InstanceId, resolved: InstanceId) {
        if !self.used.contains(&resolved) {
            self.used.push(resolved);
        }
        self.resolved.insert(instance, resolved);
    }

    /// Map an instance onto something outside this concept
    pub fn add_external(&mut self, instance: InstanceId, resolved: InstanceId) {
        self.resolved.insert(instance, resolved);
    }

    pub fn get(&self, instance: InstanceId) -> Option<InstanceId> {
        self.resolved.get(&instance).copied()
    }

    /// Members allocated to a used instance
    pub fn children(&self, used: InstanceId) -> Vec<InstanceId> {
        let mut children: Vec<InstanceId> = self
            .resolved
            .iter()
            .filter(|(_, r)| **r == used)
            .map(|(i, _)| *i)
            .collect();
        children.sort_unstable();
        children
    }
}
