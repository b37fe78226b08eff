//! Issues and counters collected while a taxonomy is built
use crate::core::concept::TaxonConcept;
use crate::core::instance::TaxonConceptInstance;
use crate::Result;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    /// Informational; nothing is wrong
    Note,
    /// Input failed a consistency check and was repaired or skipped
    Validation,
    /// Something needs an operator's attention
    Problem,
    /// Two claims could not be reconciled
    Collision,
    Error,
}

impl IssueKind {
    pub fn label(&self) -> &'static str {
        match self {
            IssueKind::Note => "note",
            IssueKind::Validation => "validation",
            IssueKind::Problem => "problem",
            IssueKind::Collision => "collision",
            IssueKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub kind: IssueKind,
    pub code: String,
    #[serde(rename = "taxonID")]
    pub taxon_id: Option<String>,
    pub provider: Option<String>,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    issues: Mutex<Vec<Issue>>,
    reported: DashMap<String, ()>,
    counts: DashMap<&'static str, usize>,
}

impl BuildReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, issue: Issue) {
        match issue.kind {
            IssueKind::Note => tracing::debug!("{}: {}", issue.code, issue.message),
            IssueKind::Validation | IssueKind::Collision => {
                tracing::info!("{}: {}", issue.code, issue.message)
            }
            IssueKind::Problem | IssueKind::Error => {
                tracing::warn!("{}: {}", issue.code, issue.message)
            }
        }
        self.count(issue_counter(issue.kind));
        self.issues.lock().push(issue);
    }

    pub fn issue(&self, kind: IssueKind, code: &str, message: impl Into<String>) {
        self.record(Issue {
            kind,
            code: code.to_string(),
            taxon_id: None,
            provider: None,
            message: message.into(),
        });
    }

    /// An issue about one instance
    pub fn instance(
        &self,
        kind: IssueKind,
        code: &str,
        instance: &TaxonConceptInstance,
        provider: Option<&str>,
        message: impl Into<String>,
    ) {
        self.record(Issue {
            kind,
            code: code.to_string(),
            taxon_id: Some(instance.taxon_id.clone()),
            provider: provider.map(str::to_string),
            message: message.into(),
        });
    }

    /// Notes repeat across resolution rounds, so each is kept once per instance
    pub fn note_instance(&self, code: &str, instance: &TaxonConceptInstance) {
        let label = format!("{}:{}:{}", code, instance.provider, instance.taxon_id);
        if self.reported.insert(label, ()).is_none() {
            self.instance(IssueKind::Note, code, instance, None, instance.label());
        }
    }

    pub fn note_concept(&self, code: &str, concept: &TaxonConcept) {
        let key = concept.key.to_string();
        self.once(&key, IssueKind::Note, code, key.clone());
    }

    /// Record an issue only the first time `label` is seen; returns true if recorded
    pub fn once(&self, label: &str, kind: IssueKind, code: &str, message: impl Into<String>) -> bool {
        if self.reported.insert(format!("{}:{}", code, label), ()).is_some() {
            return false;
        }
        self.issue(kind, code, message);
        true
    }

    pub fn count(&self, key: &'static str) {
        self.add(key, 1);
    }

    pub fn add(&self, key: &'static str, n: usize) {
        *self.counts.entry(key).or_insert(0) += n;
    }

    pub fn get(&self, key: &str) -> usize {
        self.counts.get(key).map(|c| *c).unwrap_or(0)
    }

    /// Counters in name order
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        self.counts.iter().map(|e| (*e.key(), *e.value())).collect()
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.issues.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.issues.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Issues carrying a given code
    pub fn with_code(&self, code: &str) -> Vec<Issue> {
        self.issues
            .lock()
            .iter()
            .filter(|i| i.code == code)
            .cloned()
            .collect()
    }

    pub fn by_kind(&self) -> BTreeMap<IssueKind, usize> {
        let mut kinds = BTreeMap::new();
        for issue in self.issues.lock().iter() {
            *kinds.entry(issue.kind).or_insert(0) += 1;
        }
        kinds
    }

    pub fn write_csv(&self, path: &Path, delimiter: u8) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(path)?;
        writer.write_record(["kind", "code", "taxonID", "provider", "message"])?;
        for issue in self.issues.lock().iter() {
            writer.write_record([
                issue.kind.label(),
                issue.code.as_str(),
                issue.taxon_id.as_deref().unwrap_or(""),
                issue.provider.as_deref().unwrap_or(""),
                issue.message.as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn issue_counter(kind: IssueKind) -> &'static str {
    match kind {
        IssueKind::Note => "issues.note",
        IssueKind::Validation => "issues.validation",
        IssueKind::Problem => "issues.problem",
        IssueKind::Collision => "issues.collision",
        IssueKind::Error => "issues.error",
    }
}
