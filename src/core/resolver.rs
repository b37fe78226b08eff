//! Least-upper-bound placement and per-concept resolution.
//!
//! Resolution works on a read-only view of the arena so every concept of a round
//! can be resolved in parallel; results are applied between rounds.

use crate::core::concept::{TaxonConcept, TaxonResolution};
use crate::core::instance::{ConceptId, InstanceId, TaxonConceptInstance};
use crate::taxonomy::report::BuildReport;
use smallvec::SmallVec;
use std::cmp::Ordering;

/// A view of instance placement used by the least-upper-bound walk
pub trait TaxonTree {
    /// Parent of an instance, as its current representative
    fn parent_of(&self, id: InstanceId) -> Option<InstanceId>;

    /// Accepted instance of a synonym, as its current representative
    fn accepted_of(&self, id: InstanceId) -> Option<InstanceId>;

    /// Grouping two instances must share to count as the same taxon
    fn container_of(&self, id: InstanceId) -> Option<ConceptId>;

    /// Bound on any walk up the tree
    fn max_depth(&self) -> usize;

    fn same_taxon(&self, a: InstanceId, b: InstanceId) -> bool {
        a == b
            || matches!(
                (self.container_of(a), self.container_of(b)),
                (Some(ca), Some(cb)) if ca == cb
            )
    }
}

/// Walk from an instance to its root, mapping synonyms onto their accepted taxa
fn ancestry<T: TaxonTree + ?Sized>(tree: &T, id: InstanceId) -> SmallVec<[InstanceId; 16]> {
    let mut chain = SmallVec::new();
    let mut current = Some(id);
    while let Some(node) = current {
        if chain.len() >= tree.max_depth() {
            break;
        }
        let anchor = tree.accepted_of(node).unwrap_or(node);
        if chain.contains(&anchor) {
            break;
        }
        chain.push(anchor);
        current = tree.parent_of(anchor);
    }
    chain
}

/// Most specific common ancestor of two instances, `None` when the trees are disjoint
pub fn lub<T: TaxonTree + ?Sized>(tree: &T, a: InstanceId, b: InstanceId) -> Option<InstanceId> {
    let second = ancestry(tree, b);
    ancestry(tree, a)
        .into_iter()
        .find(|r1| second.iter().any(|r2| tree.same_taxon(*r1, *r2)))
}

/// Fold [`lub`] over a collection; `None` for an empty collection or disjoint members
pub fn lub_all<T, I>(tree: &T, ids: I) -> Option<InstanceId>
where
    T: TaxonTree + ?Sized,
    I: IntoIterator<Item = InstanceId>,
{
    let mut ids = ids.into_iter();
    let first = ids.next()?;
    ids.try_fold(first, |acc, id| lub(tree, acc, id))
}

/// Best first: score, then provider declaration order, then identifier
pub fn score_order(a: &TaxonConceptInstance, b: &TaxonConceptInstance) -> Ordering {
    b.score()
        .cmp(&a.score())
        .then_with(|| a.provider.cmp(&b.provider))
        .then_with(|| a.taxon_id.cmp(&b.taxon_id))
}

/// Read-only resolver over the arena state of the previous round
pub struct ConceptResolver<'a> {
    pub instances: &'a [TaxonConceptInstance],
    pub concepts: &'a [TaxonConcept],
    pub accepted_cutoff: i32,
    pub max_steps: usize,
}

impl<'a> ConceptResolver<'a> {
    /// The instance an instance currently resolves to, following concept resolutions
    pub fn representative(&self, id: InstanceId) -> InstanceId {
        let mut current = id;
        for _ in 0..self.max_steps {
            let next = self.instances[current]
                .concept
                .and_then(|c| self.concepts[c].resolution.as_ref())
                .and_then(|r| r.get(current));
            match next {
                Some(next) if next != current => current = next,
                _ => break,
            }
        }
        current
    }

    fn name_of(&self, id: InstanceId) -> Option<usize> {
        self.container_of(id).map(|c| self.concepts[c].name)
    }

    /// Instances from the provider with the best eligible claim on the concept
    pub fn principals(&self, concept: ConceptId, report: &BuildReport) -> Vec<InstanceId> {
        let members = &self.concepts[concept].instances;
        let pick = |filter: &dyn Fn(&TaxonConceptInstance) -> bool| -> Vec<InstanceId> {
            members
                .iter()
                .copied()
                .filter(|id| filter(&self.instances[*id]))
                .collect()
        };

        let mut candidates = pick(&|i| {
            i.is_primary() && !i.is_forbidden() && i.score() > self.accepted_cutoff
        });
        if candidates.is_empty() {
            report.note_concept("taxonResolver.noPrincipals", &self.concepts[concept]);
            candidates = pick(&|i| !i.is_forbidden());
        }
        if candidates.is_empty() {
            candidates = members.clone();
        }

        let Some(best) = candidates
            .iter()
            .copied()
            .min_by(|a, b| score_order(&self.instances[*a], &self.instances[*b]))
        else {
            return Vec::new();
        };
        let source = self.instances[best].provider;
        let mut principals: Vec<InstanceId> = candidates
            .into_iter()
            .filter(|id| self.instances[*id].provider == source)
            .collect();
        principals.sort_by(|a, b| score_order(&self.instances[*a], &self.instances[*b]));
        principals
    }

    /// Resolve every member of a concept against its principals
    pub fn resolve(&self, concept: ConceptId, principals: Vec<InstanceId>, report: &BuildReport) -> TaxonResolution {
        let mut resolution = TaxonResolution::new(principals);
        let mut members = self.concepts[concept].instances.clone();
        members.sort_by(|a, b| score_order(&self.instances[*a], &self.instances[*b]));
        for id in members {
            self.resolve_instance(id, concept, &mut resolution, report);
        }
        resolution
    }

    fn resolve_instance(
        &self,
        id: InstanceId,
        concept: ConceptId,
        resolution: &mut TaxonResolution,
        report: &BuildReport,
    ) {
        if resolution.principals.contains(&id) {
            resolution.add_internal(id, id);
            return;
        }
        let instance = &self.instances[id];
        let status = instance.status;
        let group = status.group();
        let name = self.concepts[concept].name;
        let accepted = instance.accepted.map(|a| self.representative(a));
        let accepted_concept = accepted.and_then(|a| self.container_of(a));
        let accepted_name = accepted.and_then(|a| self.name_of(a));

        let used = resolution.used.clone();
        let find = |filter: &dyn Fn(&TaxonConceptInstance, InstanceId) -> bool| {
            used.iter().copied().find(|u| filter(&self.instances[*u], *u))
        };
        let accepted_concept_of = |u: InstanceId| {
            self.instances[u]
                .accepted
                .and_then(|a| self.container_of(self.representative(a)))
        };
        let accepted_name_of = |u: InstanceId| {
            self.instances[u]
                .accepted
                .and_then(|a| self.name_of(self.representative(a)))
        };

        let found = if instance.is_accepted() && instance.is_primary() {
            let found = find(&|u, _| u.is_accepted() && u.concept == Some(concept))
                .or_else(|| find(&|u, uid| u.is_accepted() && self.name_of(uid) == Some(name)))
                .or_else(|| find(&|u, _| u.is_accepted()));
            if found.is_none() {
                let synonyms: Vec<InstanceId> = used
                    .iter()
                    .copied()
                    .filter(|u| self.instances[*u].is_synonym() && !self.instances[*u].is_forbidden())
                    .collect();
                if let Some(target) = lub_all(self, synonyms) {
                    report.note_instance("taxonResolver.synonyms", instance);
                    resolution.add_external(id, target);
                    return;
                }
            }
            found
        } else if instance.is_synonym() && instance.is_primary() && accepted.is_some() {
            let found = find(&|u, uid| u.status == status && accepted_concept_of(uid) == accepted_concept)
                .or_else(|| find(&|u, uid| u.status.group() == group && accepted_concept_of(uid) == accepted_concept))
                .or_else(|| find(&|u, uid| u.status == status && accepted_name_of(uid) == accepted_name))
                .or_else(|| find(&|u, uid| u.status.group() == group && accepted_name_of(uid) == accepted_name));
            if found.is_none() {
                let synonyms: Vec<InstanceId> = used
                    .iter()
                    .copied()
                    .filter(|u| self.instances[*u].is_synonym() && !self.instances[*u].is_forbidden())
                    .collect();
                let target = match synonyms.as_slice() {
                    [single] => Some(*single),
                    _ => lub_all(self, synonyms),
                };
                if let Some(target) = target {
                    report.note_instance("taxonResolver.synonyms", instance);
                    resolution.add_external(id, target);
                    return;
                }
            }
            found
        } else if instance.accepted.is_some() {
            find(&|u, uid| u.status == status && accepted_concept_of(uid) == accepted_concept)
                .or_else(|| find(&|u, uid| u.status == status && accepted_name_of(uid) == accepted_name))
        } else {
            find(&|u, _| u.status == status)
        };

        resolution.add_internal(id, found.unwrap_or(id));
    }
}

impl TaxonTree for ConceptResolver<'_> {
    fn parent_of(&self, id: InstanceId) -> Option<InstanceId> {
        self.instances[id].parent.map(|p| self.representative(p))
    }

    fn accepted_of(&self, id: InstanceId) -> Option<InstanceId> {
        self.instances[id].accepted.map(|a| self.representative(a))
    }

    fn container_of(&self, id: InstanceId) -> Option<ConceptId> {
        self.instances[id].concept
    }

    fn max_depth(&self) -> usize {
        self.max_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    /// Plain parent-pointer forest
    #[derive(Debug)]
    struct Forest {
        parents: Vec<Option<usize>>,
    }

    impl TaxonTree for Forest {
        fn parent_of(&self, id: InstanceId) -> Option<InstanceId> {
            self.parents[id]
        }

        fn accepted_of(&self, _id: InstanceId) -> Option<InstanceId> {
            None
        }

        fn container_of(&self, id: InstanceId) -> Option<ConceptId> {
            Some(id)
        }

        fn max_depth(&self) -> usize {
            self.parents.len() + 1
        }
    }

    //        0            5
    //      /   \          |
    //     1     2         6
    //    / \     \
    //   3   4     7
    fn forest() -> Forest {
        Forest {
            parents: vec![None, Some(0), Some(0), Some(1), Some(1), None, Some(5), Some(2)],
        }
    }

    #[rstest]
    #[case(3, 4, Some(1))]
    #[case(3, 7, Some(0))]
    #[case(1, 4, Some(1))]
    #[case(4, 1, Some(1))]
    #[case(2, 2, Some(2))]
    #[case(3, 6, None)]
    #[case(6, 5, Some(5))]
    fn test_lub_cases(#[case] a: usize, #[case] b: usize, #[case] expected: Option<usize>) {
        assert_eq!(lub(&forest(), a, b), expected);
    }

    #[test]
    fn test_lub_all() {
        let tree = forest();
        assert_eq!(lub_all(&tree, [3, 4, 7]), Some(0));
        assert_eq!(lub_all(&tree, [3]), Some(3));
        assert_eq!(lub_all(&tree, Vec::<usize>::new()), None);
        assert_eq!(lub_all(&tree, [3, 6, 4]), None);
    }

    #[test]
    fn test_lub_survives_loops() {
        let tree = Forest {
            parents: vec![Some(1), Some(0), Some(1)],
        };
        assert_eq!(lub(&tree, 2, 0), Some(1));
    }

    struct Synonymy {
        parents: Vec<Option<usize>>,
        accepted: Vec<Option<usize>>,
    }

    impl TaxonTree for Synonymy {
        fn parent_of(&self, id: InstanceId) -> Option<InstanceId> {
            self.parents[id]
        }

        fn accepted_of(&self, id: InstanceId) -> Option<InstanceId> {
            self.accepted[id]
        }

        fn container_of(&self, id: InstanceId) -> Option<ConceptId> {
            Some(id)
        }

        fn max_depth(&self) -> usize {
            8
        }
    }

    #[test]
    fn test_lub_maps_synonyms_to_accepted() {
        // 3 is a synonym of 2
        let tree = Synonymy {
            parents: vec![None, Some(0), Some(0), None],
            accepted: vec![None, None, None, Some(2)],
        };
        assert_eq!(lub(&tree, 3, 1), Some(0));
        assert_eq!(lub(&tree, 3, 2), Some(2));
    }

    fn arb_forest() -> impl Strategy<Value = Forest> {
        (2usize..24).prop_flat_map(|n| {
            proptest::collection::vec(any::<(bool, usize)>(), n).prop_map(|links| Forest {
                parents: links
                    .iter()
                    .enumerate()
                    .map(|(i, (root, p))| if i == 0 || *root { None } else { Some(p % i) })
                    .collect(),
            })
        })
    }

    fn is_ancestor(tree: &Forest, a: usize, b: usize) -> bool {
        let mut current = Some(b);
        while let Some(node) = current {
            if node == a {
                return true;
            }
            current = tree.parents[node];
        }
        false
    }

    proptest! {
        #[test]
        fn prop_lub_laws(tree in arb_forest(), a in any::<usize>(), b in any::<usize>(), c in any::<usize>()) {
            let n = tree.parents.len();
            let (a, b, c) = (a % n, b % n, c % n);

            prop_assert_eq!(lub(&tree, a, a), Some(a));
            prop_assert_eq!(lub(&tree, a, b), lub(&tree, b, a));

            let left = lub(&tree, a, b).and_then(|ab| lub(&tree, ab, c));
            let right = lub(&tree, b, c).and_then(|bc| lub(&tree, a, bc));
            prop_assert_eq!(left, right);

            if is_ancestor(&tree, a, b) {
                prop_assert_eq!(lub(&tree, a, b), Some(a));
            }
        }
    }
}
