//! Scoring, unranked placement and concept resolution.

use crate::bio::TaxonomicRank;
use crate::core::concept::TaxonResolution;
use crate::core::config::RankInference;
use crate::core::instance::{ConceptId, InstanceId};
use crate::core::provider::DEFAULT_SCORE;
use crate::core::resolver::score_order;
use crate::taxonomy::report::IssueKind;
use crate::taxonomy::{BuildState, Discard, Taxonomy};
use crate::Result;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};

impl Taxonomy {
    pub fn resolve_taxon(&mut self) -> Result<()> {
        self.expect_state("resolve_taxon", &[BuildState::LinksResolved])?;
        self.score_instances();
        self.resolve_unranked();
        self.validate_homonyms();
        self.merge_unauthored();
        self.resolve_concepts();
        self.resolve_discards();
        self.set_state(BuildState::TaxaResolved);
        Ok(())
    }

    /// Specific score of the instance or its nearest same-provider ancestor
    fn base_score(&self, id: InstanceId) -> i32 {
        let provider_index = self.instances[id].provider;
        let Some(provider) = self.providers().get(provider_index) else {
            return DEFAULT_SCORE;
        };
        let mut current = id;
        for _ in 0..self.config().taxonomy.max_resolution_steps {
            let instance = &self.instances[current];
            if let Some(score) = provider.specific_score(instance) {
                return score;
            }
            match instance.parent {
                Some(parent) if self.instances[parent].provider == provider_index => {
                    current = parent
                }
                _ => break,
            }
        }
        provider.default_score
    }

    fn score_instances(&mut self) {
        let pb = self.progress(self.instances.len(), "Scoring instances");
        let scores: Vec<(i32, i32, Option<String>)> = (0..self.instances.len())
            .into_par_iter()
            .map(|id| {
                let base = self.base_score(id);
                let instance = &self.instances[id];
                let (score, forbidden) = match self.provider_of(instance) {
                    Some(provider) => provider.score(base, instance),
                    None => (base, None),
                };
                pb.inc(1);
                (base, score, forbidden)
            })
            .collect();
        pb.finish_and_clear();

        for (id, (base, score, forbidden)) in scores.into_iter().enumerate() {
            let instance = &mut self.instances[id];
            instance.base_score = Some(base);
            instance.score = Some(score);
            if let Some(reason) = forbidden {
                instance.note(format!("Forbidden by {}", reason));
                instance.forbidden = Some(reason);
                self.report.count("count.forbidden");
            }
        }
        tracing::info!(
            "Scored {} instances, {} forbidden",
            self.instances.len(),
            self.report.get("count.forbidden")
        );
    }

    /// Move unranked instances into a ranked concept of the same name, or infer a rank
    fn resolve_unranked(&mut self) {
        let mut children: HashMap<InstanceId, Vec<InstanceId>> = HashMap::new();
        for (id, instance) in self.instances.iter().enumerate() {
            if let Some(parent) = instance.parent {
                children.entry(parent).or_default().push(id);
            }
        }

        for id in 0..self.instances.len() {
            let instance = &self.instances[id];
            let reassignable = instance.rank.is_unranked()
                && !instance.is_forbidden()
                && self
                    .provider_of(instance)
                    .is_some_and(|p| p.unranked_strategy.reassigns(instance.status));
            if !reassignable {
                continue;
            }

            if let Some(target) = self.ranked_concept(id) {
                self.report.note_instance("unranked.reassigned", &self.instances[id]);
                self.instances[id].note("Unranked name placed in a ranked concept");
                self.move_instance(id, target);
                self.report.count("count.unranked.reassigned");
                continue;
            }

            let infers = self
                .provider_of(&self.instances[id])
                .is_some_and(|p| p.unranked_strategy.infer_rank());
            if !infers {
                continue;
            }
            if let Some(rank) = self.infer_rank(id, &children) {
                let mut key = self.instances[id].key.clone();
                key.rank = rank;
                let target = self.concept_for(&key);
                self.instances[id].note(format!("Rank inferred as {}", rank));
                self.move_instance(id, target);
                self.report.count("count.unranked.inferred");
            }
        }
    }

    /// Best ranked concept sharing the instance's name
    fn ranked_concept(&self, id: InstanceId) -> Option<ConceptId> {
        let instance = &self.instances[id];
        let name = self.concepts[instance.concept?].name;
        let (_, scientific_name) = self.names.get_index(name)?;
        let ranked: Vec<ConceptId> = scientific_name
            .concepts
            .iter()
            .copied()
            .filter(|c| {
                let concept = &self.concepts[*c];
                concept.is_active() && !concept.rank().is_unranked()
            })
            .collect();

        let same_author: Vec<ConceptId> = ranked
            .iter()
            .copied()
            .filter(|c| {
                instance.key.authorship.is_some()
                    && self.concepts[*c].key.authorship == instance.key.authorship
            })
            .collect();
        let candidates = if same_author.is_empty() {
            ranked
        } else {
            same_author
        };

        let accepted_rank = instance
            .accepted
            .map(|a| self.instances[a].rank)
            .filter(|r| !r.is_unranked());
        if let Some(rank) = accepted_rank {
            if let Some(found) = candidates.iter().copied().find(|c| self.concepts[*c].rank() == rank) {
                return Some(found);
            }
        }
        candidates.into_iter().min_by(|a, b| {
            self.concepts[*b]
                .top_score(&self.instances)
                .cmp(&self.concepts[*a].top_score(&self.instances))
                .then_with(|| a.cmp(b))
        })
    }

    fn infer_rank(
        &self,
        id: InstanceId,
        children: &HashMap<InstanceId, Vec<InstanceId>>,
    ) -> Option<TaxonomicRank> {
        let instance = &self.instances[id];
        let accepted_rank = || {
            instance
                .accepted
                .map(|a| self.instances[a].rank)
                .filter(|r| !r.is_unranked())
        };
        match self.config().taxonomy.rank_inference {
            RankInference::NameAnalysis => instance.implied_rank.or_else(accepted_rank),
            RankInference::AcceptedRank => accepted_rank(),
            RankInference::SiblingMajority => {
                let siblings = children.get(&instance.parent?)?;
                let mut counts: BTreeMap<TaxonomicRank, usize> = BTreeMap::new();
                for sibling in siblings.iter().filter(|s| **s != id) {
                    let rank = self.instances[*sibling].rank;
                    if !rank.is_unranked() {
                        *counts.entry(rank).or_insert(0) += 1;
                    }
                }
                counts
                    .into_iter()
                    .max_by(|(ra, ca), (rb, cb)| ca.cmp(cb).then_with(|| rb.id().cmp(&ra.id())))
                    .map(|(rank, _)| rank)
            }
        }
    }

    /// Accepted formal concepts that share a name and rank but not an author
    fn validate_homonyms(&self) {
        for (_, name) in self.names.iter() {
            let mut authors: BTreeMap<TaxonomicRank, BTreeSet<String>> = BTreeMap::new();
            for concept in name.concepts.iter().map(|c| &self.concepts[*c]) {
                if !concept.is_active() || !concept.is_formal() || !concept.has_accepted(&self.instances) {
                    continue;
                }
                if let Some(author) = &concept.key.authorship {
                    authors.entry(concept.rank()).or_default().insert(author.clone());
                }
            }
            for (rank, authors) in authors.into_iter().filter(|(_, a)| a.len() > 1) {
                let label = format!("{}:{}", name.key, rank);
                let message = format!(
                    "{} {} has {} accepted authors: {}",
                    rank,
                    name.key.scientific_name,
                    authors.len(),
                    authors.into_iter().collect::<Vec<_>>().join(", ")
                );
                if self.report.once(&label, IssueKind::Collision, "homonym", message) {
                    self.report.count("count.homonyms");
                }
            }
        }
    }

    /// Unauthored accepted concepts join the principal authored concept of the same rank
    fn merge_unauthored(&mut self) {
        let mut merges: Vec<(ConceptId, ConceptId)> = Vec::new();
        for (_, name) in self.names.iter() {
            let active: Vec<ConceptId> = name
                .concepts
                .iter()
                .copied()
                .filter(|c| self.concepts[*c].is_active())
                .collect();
            let ranks: BTreeSet<TaxonomicRank> = active.iter().map(|c| self.concepts[*c].rank()).collect();
            for rank in ranks {
                let at_rank = active.iter().copied().filter(|c| self.concepts[*c].rank() == rank);
                let principal = at_rank
                    .clone()
                    .filter(|c| {
                        let concept = &self.concepts[*c];
                        concept.is_formal() && concept.is_authored() && concept.has_accepted(&self.instances)
                    })
                    .min_by(|a, b| {
                        self.concepts[*b]
                            .top_score(&self.instances)
                            .cmp(&self.concepts[*a].top_score(&self.instances))
                            .then_with(|| a.cmp(b))
                    });
                let Some(principal) = principal else {
                    continue;
                };
                merges.extend(
                    at_rank
                        .filter(|c| {
                            let concept = &self.concepts[*c];
                            !concept.is_authored() && concept.has_accepted(&self.instances)
                        })
                        .map(|c| (c, principal)),
                );
            }
        }

        for (from, into) in merges {
            let members = self.concepts[from].instances.clone();
            for id in members {
                self.move_instance(id, into);
            }
            self.concepts[from].merged_into = Some(into);
            self.report.note_concept("taxonomy.mergedUnauthored", &self.concepts[from]);
            self.report.count("count.concepts.merged");
        }
    }

    /// Resolve every concept in parallel rounds until nothing changes
    fn resolve_concepts(&mut self) {
        let active: Vec<ConceptId> = self.concepts().map(|(id, _)| id).collect();
        let rounds = self.config().taxonomy.max_resolution_steps;
        let mut converged = false;

        for round in 1..=rounds {
            let pb = self.progress(active.len(), &format!("Resolving concepts, round {}", round));
            let resolutions: Vec<(ConceptId, TaxonResolution)> = {
                let resolver = self.resolver();
                let report = self.report();
                active
                    .par_iter()
                    .map(|concept| {
                        let principals = resolver.principals(*concept, report);
                        let resolution = resolver.resolve(*concept, principals, report);
                        pb.inc(1);
                        (*concept, resolution)
                    })
                    .collect()
            };
            pb.finish_and_clear();

            let mut changed = 0;
            for (concept, resolution) in resolutions {
                if self.concepts[concept].resolution.as_ref() != Some(&resolution) {
                    changed += 1;
                    self.concepts[concept].resolution = Some(resolution);
                }
            }
            tracing::debug!("Resolution round {}: {} concepts changed", round, changed);
            if changed == 0 {
                converged = true;
                break;
            }
        }

        if !converged {
            self.report.issue(
                IssueKind::Problem,
                "taxonResolver.unconverged",
                format!("Concept resolution still changing after {} rounds", rounds),
            );
        }
        self.report.add("count.concepts", active.len());
        tracing::info!("Resolved {} concepts", active.len());
    }

    /// Forbidden instances that still stand for themselves follow their provider's discard strategy
    fn resolve_discards(&mut self) {
        let mut discards = BTreeMap::new();
        {
            let resolver = self.resolver();
            for (_, concept) in self.concepts() {
                let Some(resolution) = &concept.resolution else {
                    continue;
                };
                for id in resolution.used.iter().copied() {
                    let instance = &self.instances[id];
                    if !instance.is_forbidden() {
                        continue;
                    }
                    let Some(provider) = self.provider_of(instance) else {
                        continue;
                    };

                    let mut target = None;
                    let mut next = instance.accepted.or(instance.parent);
                    for _ in 0..self.config().taxonomy.max_resolution_steps {
                        let Some(candidate) = next.map(|n| resolver.representative(n)) else {
                            break;
                        };
                        let candidate_instance = &self.instances[candidate];
                        if !candidate_instance.is_forbidden() {
                            target = Some(candidate);
                            break;
                        }
                        next = candidate_instance.accepted.or(candidate_instance.parent);
                    }

                    discards.insert(
                        id,
                        Discard {
                            strategy: provider.discard_strategy,
                            target,
                        },
                    );
                }
            }
        }
        self.report.add("count.discarded", discards.len());
        self.discards = discards;
    }
}
