//! Audit ledger — reconciles retrieved items against final results.
//!
//! Retrieval code reports every item it pulls into a candidate pool with
//! [`AuditLedger::record_retrieved`]; the gateway reports the items that
//! made it into a round result with [`AuditLedger::record_final`]. Each
//! final report rewrites a JSON reconciliation file listing items that
//! appeared in a result without ever being retrieved ("sideloaded"), items
//! retrieved but never used, and items in both.
//!
//! The ledger is a debugging aid. It is off unless enabled at startup, and
//! a failure to write the report never reaches the caller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Report file name used under the project root.
pub const DEFAULT_REPORT_FILE: &str = "audit_report.json";

/// Startup settings for the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSettings {
    pub enabled: bool,
    pub report_path: PathBuf,
}

impl AuditSettings {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            report_path: PathBuf::from(DEFAULT_REPORT_FILE),
        }
    }

    /// Enabled, writing to `report_path`.
    pub fn enabled_at(report_path: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            report_path: report_path.into(),
        }
    }

    /// Settings for a ledger that is on when `enabled`, writing to
    /// `report_override` or else `<project_root>/audit_report.json`.
    pub fn resolve(enabled: bool, report_override: Option<&Path>, project_root: &Path) -> Self {
        if !enabled {
            return Self::disabled();
        }
        let report_path = report_override
            .map(Path::to_path_buf)
            .unwrap_or_else(|| project_root.join(DEFAULT_REPORT_FILE));
        Self::enabled_at(report_path)
    }
}

/// The persisted reconciliation report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Final items that were never retrieved.
    pub sideloaded: Vec<String>,
    /// Retrieved items that never appeared in a result.
    pub retrieved_only: Vec<String>,
    /// Items both retrieved and in a result.
    pub final_included: Vec<String>,
    pub counts: AuditCounts,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCounts {
    pub retrieved: usize,
    pub r#final: usize,
    pub sideloaded: usize,
}

#[derive(Debug, Default)]
struct LedgerSets {
    retrieved: BTreeSet<String>,
    finals: BTreeSet<String>,
}

impl LedgerSets {
    fn reconcile(&self) -> AuditReport {
        let sideloaded: Vec<String> = self.finals.difference(&self.retrieved).cloned().collect();
        let retrieved_only = self.retrieved.difference(&self.finals).cloned().collect();
        let final_included = self.finals.intersection(&self.retrieved).cloned().collect();
        AuditReport {
            counts: AuditCounts {
                retrieved: self.retrieved.len(),
                r#final: self.finals.len(),
                sideloaded: sideloaded.len(),
            },
            sideloaded,
            retrieved_only,
            final_included,
        }
    }
}

/// Process-wide reconciliation state.
///
/// Construct once at startup and share via `Arc`. Both sets live behind a
/// single `Mutex`, so a final report always sees a consistent pair.
#[derive(Debug)]
pub struct AuditLedger {
    enabled: bool,
    report_path: PathBuf,
    sets: Mutex<LedgerSets>,
}

impl AuditLedger {
    pub fn new(settings: AuditSettings) -> Self {
        if settings.enabled {
            info!(path = %settings.report_path.display(), "Item audit enabled");
        }
        Self {
            enabled: settings.enabled,
            report_path: settings.report_path,
            sets: Mutex::new(LedgerSets::default()),
        }
    }

    /// A ledger that ignores every call.
    pub fn disabled() -> Self {
        Self::new(AuditSettings::disabled())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    /// Record items pulled into a candidate pool. Empty ids are skipped.
    pub fn record_retrieved<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.enabled {
            return;
        }
        let mut sets = self.sets.lock().unwrap_or_else(|e| e.into_inner());
        insert_ids(&mut sets.retrieved, ids);
    }

    /// Record items included in a final result and rewrite the report.
    pub fn record_final<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.enabled {
            return;
        }
        let mut sets = self.sets.lock().unwrap_or_else(|e| e.into_inner());
        insert_ids(&mut sets.finals, ids);
        let report = sets.reconcile();
        if let Err(e) = write_report(&self.report_path, &report) {
            debug!(path = %self.report_path.display(), error = %e, "Audit report not written");
        }
    }

    /// Record every item of a document collection as retrieved.
    pub fn record_retrieved_documents(&self, collection: &serde_json::Value) {
        if !self.enabled {
            return;
        }
        self.record_retrieved(item_ids_from_collection(collection));
    }

    /// Current reconciliation, or `None` when disabled.
    pub fn report(&self) -> Option<AuditReport> {
        if !self.enabled {
            return None;
        }
        let sets = self.sets.lock().unwrap_or_else(|e| e.into_inner());
        Some(sets.reconcile())
    }
}

fn insert_ids<I, S>(set: &mut BTreeSet<String>, ids: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for id in ids {
        let id = id.as_ref();
        if !id.is_empty() {
            set.insert(id.to_string());
        }
    }
}

fn write_report(path: &Path, report: &AuditReport) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
}

/// Item ids of a document collection (`{"documents": [{"corpus_id": ..}]}`).
///
/// Documents without a usable id are skipped; anything that is not a
/// collection yields nothing.
pub fn item_ids_from_collection(collection: &serde_json::Value) -> Vec<String> {
    collection
        .get("documents")
        .and_then(|docs| docs.as_array())
        .map(|docs| {
            docs.iter()
                .filter_map(|doc| item_id(doc.get("corpus_id")?))
                .collect()
        })
        .unwrap_or_default()
}

/// A single item id: a non-empty string, or a number rendered as text.
pub fn item_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Item ids of a round payload's `doc_collection`.
pub fn item_ids_from_payload(payload: &serde_json::Map<String, serde_json::Value>) -> Vec<String> {
    payload
        .get("doc_collection")
        .map(item_ids_from_collection)
        .unwrap_or_default()
}
