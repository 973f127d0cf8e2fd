//! DashMap DNS Directory
//!
//! Implements DnsDirectory as an in-memory zone keyed by (name, type),
//! served by the DNS server adapter.

use crate::domain::entities::DnsRecordSet;
use crate::domain::ports::DnsDirectory;
use crate::domain::value_objects::{normalize_name, RecordType, ZoneName};
use crate::error::{NlbError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory zone store.
#[derive(Clone)]
pub struct DashMapDnsDirectory {
    zone: ZoneName,
    records: Arc<DashMap<(String, RecordType), DnsRecordSet>>,
}

impl DashMapDnsDirectory {
    pub fn new(zone: ZoneName) -> Self {
        Self {
            zone,
            records: Arc::new(DashMap::new()),
        }
    }

    pub fn zone(&self) -> &ZoneName {
        &self.zone
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every record set currently held under `name`.
    pub fn records_for(&self, name: &str) -> Vec<DnsRecordSet> {
        let name = normalize_name(name);
        let mut sets: Vec<DnsRecordSet> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == name)
            .map(|entry| entry.value().clone())
            .collect();
        sets.sort_by_key(|r| r.record_type);
        sets
    }
}

#[async_trait]
impl DnsDirectory for DashMapDnsDirectory {
    async fn upsert(&self, mut record_set: DnsRecordSet) -> Result<()> {
        record_set.name = normalize_name(&record_set.name);

        if record_set.values.is_empty() {
            return Err(NlbError::EmptyRecordSet(format!(
                "{} {}",
                record_set.name, record_set.record_type
            )));
        }
        if !self.zone.contains(&record_set.name) {
            return Err(NlbError::Dns(format!(
                "{} is not inside zone {}",
                record_set.name, self.zone
            )));
        }
        if record_set.record_type == RecordType::Cname && record_set.values.len() > 1 {
            return Err(NlbError::Dns(format!(
                "CNAME {} must have exactly one target",
                record_set.name
            )));
        }

        tracing::debug!(
            name = %record_set.name,
            record_type = %record_set.record_type,
            values = record_set.values.len(),
            "record set upserted"
        );

        self.records
            .insert((record_set.name.clone(), record_set.record_type), record_set);
        Ok(())
    }

    async fn lookup(&self, name: &str, record_type: RecordType) -> Option<DnsRecordSet> {
        self.records
            .get(&(normalize_name(name), record_type))
            .map(|entry| entry.value().clone())
    }
}
