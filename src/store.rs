//! In-memory record store shared by the status processor and the responder.
//!
//! Records are grouped by owner name and record type. The set of keys and the
//! number of records under each key are fixed once the store is built; only
//! the `enabled` flag and `last_change` timestamp of a record change at
//! runtime, and only through [`RecordStore::apply`], which the status
//! processor is the sole caller of.

use hickory_proto::rr::{LowerName, Record, RecordType};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

use crate::health::CheckResult;
use crate::metrics;

/// Process-local handle correlating a health check with its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(usize);

impl RecordId {
    /// Raw index of this handle.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A served record together with its health state.
#[derive(Debug, Clone)]
pub struct DynamicRecord {
    /// Correlation handle; `None` for static records that are never checked.
    pub id: Option<RecordId>,
    /// The resource record returned in answers.
    pub record: Record,
    /// Whether the latest check succeeded.
    pub enabled: bool,
    /// When `enabled` last flipped (or when the store was built).
    pub last_change: SystemTime,
}

/// Result of looking up a name and type, taken under a single read lock.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// No record of any type exists under the name.
    UnknownName,
    /// The name exists but has no records of the requested type.
    NoSuchType,
    /// Records exist for the name and type, but none is enabled.
    AllDisabled,
    /// Enabled records in insertion order.
    Enabled(Vec<Record>),
}

/// Effect of applying a check result to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The record's enabled flag flipped.
    Changed {
        /// The affected record.
        record: Record,
        /// Its new state.
        enabled: bool,
    },
    /// The record already had this state.
    Unchanged,
    /// No record carries this identifier.
    UnknownId,
}

type TypeMap = HashMap<RecordType, Vec<DynamicRecord>>;

/// Thread-safe record store.
#[derive(Debug, Clone)]
pub struct RecordStore {
    inner: Arc<RwLock<StoreInner>>,
}

#[derive(Debug, Default)]
struct StoreInner {
    /// name -> type -> records in configuration order
    records: HashMap<LowerName, TypeMap>,

    /// RecordId -> location in `records`
    index: Vec<(LowerName, RecordType, usize)>,
}

/// Collects records before the store is shared.
#[derive(Debug, Default)]
pub struct RecordStoreBuilder {
    inner: StoreInner,
}

impl RecordStoreBuilder {
    /// Add a health-checked record, initially disabled. Returns its handle.
    pub fn add_checked(&mut self, record: Record) -> RecordId {
        let id = RecordId(self.inner.index.len());
        let (name, rtype, position) = self.push(DynamicRecord {
            id: Some(id),
            record,
            enabled: false,
            last_change: SystemTime::now(),
        });
        self.inner.index.push((name, rtype, position));
        id
    }

    /// Add a record that is always served and never checked.
    pub fn add_static(&mut self, record: Record) {
        self.push(DynamicRecord {
            id: None,
            record,
            enabled: true,
            last_change: SystemTime::now(),
        });
    }

    fn push(&mut self, entry: DynamicRecord) -> (LowerName, RecordType, usize) {
        let name = LowerName::new(entry.record.name());
        let rtype = entry.record.record_type();
        let bucket = self
            .inner
            .records
            .entry(name.clone())
            .or_default()
            .entry(rtype)
            .or_default();
        bucket.push(entry);
        (name, rtype, bucket.len() - 1)
    }

    /// Freeze the key set and share the store.
    pub fn build(self) -> RecordStore {
        debug!(
            names = self.inner.records.len(),
            checked = self.inner.index.len(),
            "built record store"
        );
        RecordStore {
            inner: Arc::new(RwLock::new(self.inner)),
        }
    }
}

impl RecordStore {
    /// Start building a store.
    pub fn builder() -> RecordStoreBuilder {
        RecordStoreBuilder::default()
    }

    /// Records under a name and type, in insertion order. Empty if absent.
    pub fn get(&self, name: &LowerName, rtype: RecordType) -> Vec<DynamicRecord> {
        let inner = self.inner.read();
        inner
            .records
            .get(name)
            .and_then(|types| types.get(&rtype))
            .cloned()
            .unwrap_or_default()
    }

    /// Types that have records under a name. Empty if the name is unknown.
    pub fn get_all_types(&self, name: &LowerName) -> HashSet<RecordType> {
        let inner = self.inner.read();
        inner
            .records
            .get(name)
            .map(|types| types.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Classify a name and type against current health state.
    pub fn lookup(&self, name: &LowerName, rtype: RecordType) -> Lookup {
        let inner = self.inner.read();

        let Some(types) = inner.records.get(name) else {
            return Lookup::UnknownName;
        };
        let Some(records) = types.get(&rtype) else {
            return Lookup::NoSuchType;
        };

        let enabled: Vec<Record> = records
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.record.clone())
            .collect();

        if enabled.is_empty() {
            Lookup::AllDisabled
        } else {
            Lookup::Enabled(enabled)
        }
    }

    /// Snapshot of the record carrying the given handle.
    pub fn record(&self, id: RecordId) -> Option<DynamicRecord> {
        let inner = self.inner.read();
        let (name, rtype, position) = inner.index.get(id.0)?;
        inner
            .records
            .get(name)?
            .get(rtype)?
            .get(*position)
            .cloned()
    }

    /// Apply a check result. Only the status processor calls this.
    pub(crate) fn apply(&self, result: &CheckResult) -> Applied {
        let mut inner = self.inner.write();
        let StoreInner { records, index } = &mut *inner;

        let Some((name, rtype, position)) = index.get(result.id.0) else {
            return Applied::UnknownId;
        };
        let Some(entry) = records
            .get_mut(name)
            .and_then(|types| types.get_mut(rtype))
            .and_then(|bucket| bucket.get_mut(*position))
        else {
            return Applied::UnknownId;
        };

        if entry.enabled == result.success {
            return Applied::Unchanged;
        }

        entry.enabled = result.success;
        entry.last_change = SystemTime::now();
        Applied::Changed {
            record: entry.record.clone(),
            enabled: entry.enabled,
        }
    }

    /// Number of distinct owner names.
    pub fn names_count(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Number of health-checked records.
    pub fn checked_count(&self) -> usize {
        self.inner.read().index.len()
    }

    /// Number of records currently enabled, static records included.
    pub fn enabled_count(&self) -> usize {
        self.inner
            .read()
            .records
            .values()
            .flat_map(|types| types.values())
            .flatten()
            .filter(|r| r.enabled)
            .count()
    }

    /// Emit current store metrics.
    pub fn emit_metrics(&self) {
        let inner = self.inner.read();
        let total: usize = inner
            .records
            .values()
            .flat_map(|types| types.values())
            .map(Vec::len)
            .sum();
        let enabled = inner
            .records
            .values()
            .flat_map(|types| types.values())
            .flatten()
            .filter(|r| r.enabled)
            .count();

        metrics::record_store_counts(inner.records.len(), total, enabled);
    }
}
