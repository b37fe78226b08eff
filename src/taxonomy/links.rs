//! Turning identifier references into arena links, and breaking loops.

use crate::bio::names::insensitive;
use crate::bio::{TaxonomicRank, TaxonomicStatus};
use crate::core::instance::{Classification, InstanceId};
use crate::taxonomy::report::IssueKind;
use crate::taxonomy::{BuildState, Taxonomy};
use crate::Result;
use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unseen,
    OnTrace,
    Done,
}

/// Which reference a loop runs through
#[derive(Clone, Copy)]
enum LinkKind {
    Parent,
    Accepted,
}

impl Taxonomy {
    pub fn resolve_links(&mut self) -> Result<()> {
        self.expect_state("resolve_links", &[BuildState::Loading])?;
        self.ensure_unknown();
        self.link_references();
        self.link_classifications();
        self.apply_default_parents();
        self.break_loops(LinkKind::Parent);
        self.break_loops(LinkKind::Accepted);
        self.set_state(BuildState::LinksResolved);
        tracing::info!("Resolved links for {} instances", self.instances.len());
        Ok(())
    }

    fn link_references(&mut self) {
        for id in 0..self.instances.len() {
            let provider = self.instances[id].provider;
            let parent_ref = self.instances[id].parent_name_usage_id.clone();
            let accepted_ref = self.instances[id].accepted_name_usage_id.clone();

            if let Some(parent_ref) = parent_ref {
                match self.by_id.get(&(provider, parent_ref.clone())).copied() {
                    Some(parent) if parent != id => self.instances[id].parent = Some(parent),
                    _ => self.link_issue(id, "links.parentMissing", &parent_ref),
                }
            }
            if let Some(accepted_ref) = accepted_ref {
                match self.by_id.get(&(provider, accepted_ref.clone())).copied() {
                    Some(accepted) if accepted != id => {
                        if self.instances[id].is_accepted() {
                            self.report.note_instance("links.acceptedIgnored", &self.instances[id]);
                        } else {
                            self.instances[id].accepted = Some(accepted);
                        }
                    }
                    _ => self.link_issue(id, "links.acceptedMissing", &accepted_ref),
                }
            }

            let instance = &mut self.instances[id];
            if instance.is_synonym() && instance.accepted.is_none() {
                instance.status = if instance.parent.is_some() {
                    TaxonomicStatus::InferredAccepted
                } else {
                    TaxonomicStatus::InferredUnplaced
                };
                instance.note("Synonym without an accepted taxon");
                let instance = &self.instances[id];
                self.report.instance(
                    IssueKind::Validation,
                    "links.synonymWithoutAccepted",
                    instance,
                    self.provider_label(instance),
                    format!("{} has no accepted taxon, now {}", instance.label(), instance.status),
                );
            }
        }
    }

    fn link_issue(&self, id: InstanceId, code: &str, reference: &str) {
        let instance = &self.instances[id];
        // Loose providers only publish fragments of their taxonomy
        let kind = match self.provider_of(instance) {
            Some(provider) if provider.loose => IssueKind::Note,
            _ => IssueKind::Validation,
        };
        self.report.instance(
            kind,
            code,
            instance,
            self.provider_label(instance),
            format!("{} refers to missing {}", instance.label(), reference),
        );
    }

    /// Accepted taxa with no parent, but with classification columns, hang from the
    /// closest higher taxon of the same provider
    fn link_classifications(&mut self) {
        let mut by_name: HashMap<(usize, String), Vec<InstanceId>> = HashMap::new();
        for (id, instance) in self.instances.iter().enumerate() {
            if instance.is_accepted() {
                by_name
                    .entry((instance.provider, insensitive(&instance.scientific_name)))
                    .or_default()
                    .push(id);
            }
        }

        for id in 0..self.instances.len() {
            let instance = &self.instances[id];
            if instance.parent.is_some()
                || !instance.is_accepted()
                || instance.classification.is_empty()
                || Some(id) == self.unknown
            {
                continue;
            }
            let rank = instance.rank;
            let found = Classification::HIGHER_RANKS
                .iter()
                .filter(|r| rank.is_unranked() || r.is_higher_than(rank))
                .find_map(|r| {
                    let name = instance.classification.get(*r)?;
                    let candidates = by_name.get(&(instance.provider, insensitive(name)))?;
                    candidates
                        .iter()
                        .copied()
                        .filter(|c| *c != id)
                        .find(|c| self.instances[*c].rank == *r)
                        .or_else(|| candidates.iter().copied().find(|c| *c != id))
                });
            if let Some(parent) = found {
                self.instances[id].parent = Some(parent);
                self.report.count("count.links.classification");
            }
        }
    }

    fn apply_default_parents(&mut self) {
        for id in 0..self.instances.len() {
            let instance = &self.instances[id];
            if instance.parent.is_some()
                || !instance.is_accepted()
                || Some(id) == self.unknown
                || !TaxonomicRank::Phylum.is_higher_than(instance.rank)
            {
                continue;
            }
            let Some(target) = self
                .provider_of(instance)
                .and_then(|p| p.default_parent_taxon.clone())
                .or_else(|| self.config().taxonomy.default_parent.clone())
            else {
                continue;
            };
            let parent = self
                .by_id
                .get(&(instance.provider, target.clone()))
                .copied()
                .or_else(|| self.find_by_taxon_id(&target));
            match parent {
                Some(parent) if parent != id => self.instances[id].parent = Some(parent),
                _ => self.link_issue(id, "links.defaultParentMissing", &target),
            }
        }
    }

    fn link(&self, id: InstanceId, kind: LinkKind) -> Option<InstanceId> {
        match kind {
            LinkKind::Parent => self.instances[id].parent,
            LinkKind::Accepted => self.instances[id].accepted,
        }
    }

    /// Walk every chain once; a chain that revisits its own trace is cut at the
    /// highest-ranked member of the loop
    fn break_loops(&mut self, kind: LinkKind) {
        let mut visits = vec![Visit::Unseen; self.instances.len()];
        for start in 0..self.instances.len() {
            let mut trace = Vec::new();
            let mut current = Some(start);
            while let Some(node) = current {
                match visits[node] {
                    Visit::Done => break,
                    Visit::OnTrace => {
                        let from = trace.iter().position(|t| *t == node).unwrap_or(0);
                        self.break_loop(&trace[from..], kind);
                        break;
                    }
                    Visit::Unseen => {
                        visits[node] = Visit::OnTrace;
                        trace.push(node);
                        current = self.link(node, kind);
                    }
                }
            }
            for node in trace {
                visits[node] = Visit::Done;
            }
        }
    }

    fn break_loop(&mut self, members: &[InstanceId], kind: LinkKind) {
        let Some(point) = members.iter().copied().min_by(|a, b| {
            let (a, b) = (&self.instances[*a], &self.instances[*b]);
            a.rank
                .id()
                .cmp(&b.rank.id())
                .then_with(|| a.taxon_id.cmp(&b.taxon_id))
        }) else {
            return;
        };
        let unknown = self.unknown.filter(|u| *u != point);
        let trail = members
            .iter()
            .map(|m| self.instances[*m].taxon_id.as_str())
            .collect::<Vec<_>>()
            .join(" -> ");
        let (code, message) = match kind {
            LinkKind::Parent => ("links.parentLoop", format!("Parent loop {}", trail)),
            LinkKind::Accepted => ("links.synonymLoop", format!("Synonym loop {}", trail)),
        };

        let instance = &mut self.instances[point];
        match kind {
            LinkKind::Parent => {
                instance.parent = unknown;
                instance.status = TaxonomicStatus::InferredUnplaced;
            }
            // The break point becomes the accepted taxon the rest of the loop points at
            LinkKind::Accepted => {
                instance.accepted = None;
                instance.parent = instance.parent.or(unknown);
                instance.status = TaxonomicStatus::InferredAccepted;
            }
        }
        instance.note(format!("Loop broken here: {}", trail));

        let instance = &self.instances[point];
        self.report.instance(
            IssueKind::Error,
            code,
            instance,
            self.provider_label(instance),
            format!("{}, broken at {}", message, instance.taxon_id),
        );
        self.report.count("count.links.loops");
    }
}
