//! DNS Directory Port
//!
//! Idempotent replace-style writes of named record sets.

use crate::domain::entities::DnsRecordSet;
use crate::domain::value_objects::RecordType;
use crate::error::Result;
use async_trait::async_trait;

/// Zone of record sets for the proxy fleet and its per-service aliases.
#[async_trait]
pub trait DnsDirectory: Send + Sync {
    /// Replace the full value set stored under (name, type).
    ///
    /// Implementations reject an empty value set with
    /// `NlbError::EmptyRecordSet`.
    async fn upsert(&self, record_set: DnsRecordSet) -> Result<()>;

    /// Current record set under (name, type), if any.
    async fn lookup(&self, name: &str, record_type: RecordType) -> Option<DnsRecordSet>;
}
