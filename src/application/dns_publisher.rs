//! DNS Publisher
//!
//! Writes the fleet's record sets and per-service aliases to the DNS
//! Directory. Every write replaces the full value set for its name.

use crate::domain::entities::{DnsRecordSet, FleetAddresses, TAG_SUBDOMAIN};
use crate::domain::ports::{ClusterQuery, DnsDirectory};
use crate::domain::value_objects::{normalize_name, subdomain_to_fqdn, FleetRecord, RecordType, ZoneName};
use crate::error::{NlbError, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Default TTL for fleet and alias records.
pub const DEFAULT_TTL: u32 = 60;

/// Fully-qualified names the fleet is published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetNames {
    /// Carries the public A and AAAA sets
    pub public: String,
    /// Carries the private A set
    pub private: String,
}

impl FleetNames {
    pub fn name_for(&self, record: FleetRecord) -> &str {
        match record {
            FleetRecord::PublicV4 | FleetRecord::PublicV6 => &self.public,
            FleetRecord::PrivateV4 => &self.private,
        }
    }
}

/// What a publication wrote and what it refused to write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub published: Vec<FleetRecord>,
    /// Record sets left alone because the computed member set was empty
    pub skipped: Vec<FleetRecord>,
    pub aliases: usize,
}

/// Service subdomain tags, read afresh on every publication.
pub struct TaggedAliases {
    query: Arc<dyn ClusterQuery>,
    cluster: String,
    domain: String,
    zone: ZoneName,
}

impl TaggedAliases {
    pub fn new(query: Arc<dyn ClusterQuery>, cluster: String, domain: String, zone: ZoneName) -> Self {
        Self {
            query,
            cluster,
            domain,
            zone,
        }
    }

    /// Alias names the tagged services ask for.
    ///
    /// Names outside the zone or on a fleet name are dropped with a
    /// warning. An unreadable cluster yields no tagged aliases.
    pub async fn names(&self, fleet: &FleetNames) -> Vec<String> {
        let subdomains = match service_aliases(self.query.as_ref(), &self.cluster).await {
            Ok(subdomains) => subdomains,
            Err(e) => {
                tracing::warn!(cluster = %self.cluster, "could not read service aliases: {}", e);
                return Vec::new();
            }
        };

        subdomains
            .iter()
            .filter_map(|sub| {
                let alias = subdomain_to_fqdn(sub, &self.domain);
                if !self.zone.contains(&alias) {
                    tracing::warn!(alias = %alias, zone = %self.zone, "tagged alias outside zone, ignoring");
                    return None;
                }
                if alias == normalize_name(&fleet.public) || alias == normalize_name(&fleet.private) {
                    tracing::warn!(alias = %alias, "tagged alias collides with a fleet name, ignoring");
                    return None;
                }
                Some(alias)
            })
            .collect()
    }
}

pub struct DnsPublisher {
    dns: Arc<dyn DnsDirectory>,
    names: FleetNames,
    aliases: Vec<String>,
    tagged: Option<TaggedAliases>,
    ttl: u32,
}

impl DnsPublisher {
    pub fn new(dns: Arc<dyn DnsDirectory>, names: FleetNames, aliases: Vec<String>, ttl: u32) -> Self {
        Self {
            dns,
            names,
            aliases,
            tagged: None,
            ttl,
        }
    }

    /// Also publish aliases requested through service tags.
    pub fn with_tagged_aliases(mut self, tagged: TaggedAliases) -> Self {
        self.tagged = Some(tagged);
        self
    }

    pub fn names(&self) -> &FleetNames {
        &self.names
    }

    async fn alias_names(&self) -> Vec<String> {
        let mut aliases = self.aliases.clone();
        if let Some(tagged) = &self.tagged {
            aliases.extend(tagged.names(&self.names).await);
            aliases.sort();
            aliases.dedup();
        }
        aliases
    }

    /// Publish the complete fleet address sets.
    ///
    /// A family whose set is empty is skipped and logged as an error: the
    /// fleet never advertises zero addresses because of a race. Aliases
    /// are refreshed whenever a public family was written.
    pub async fn publish(&self, fleet: &FleetAddresses) -> Result<PublishReport> {
        let mut report = PublishReport::default();
        let mut first_error: Option<NlbError> = None;

        for record in FleetRecord::ALL {
            let name = self.names.name_for(record);
            let values = fleet.values(record);

            if values.is_empty() {
                tracing::error!(
                    record = %record,
                    name = %name,
                    "computed member set is empty, refusing to publish"
                );
                report.skipped.push(record);
                continue;
            }

            let count = values.len();
            let record_set = DnsRecordSet {
                name: name.to_string(),
                record_type: record.record_type(),
                values,
                ttl: self.ttl,
            };

            match self.dns.upsert(record_set).await {
                Ok(()) => {
                    tracing::info!(record = %record, name = %name, count, "published fleet record set");
                    report.published.push(record);
                }
                Err(e) => {
                    tracing::error!(record = %record, name = %name, "failed to publish: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        let public_written = report
            .published
            .iter()
            .any(|r| matches!(r, FleetRecord::PublicV4 | FleetRecord::PublicV6));

        if public_written {
            for alias in &self.alias_names().await {
                let record_set =
                    DnsRecordSet::new(alias.clone(), RecordType::Cname, [self.names.public.as_str()], self.ttl);
                match self.dns.upsert(record_set).await {
                    Ok(()) => report.aliases += 1,
                    Err(e) => {
                        tracing::error!(alias = %alias, "failed to publish alias: {}", e);
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

/// Alias subdomains services ask for through their subdomain tag.
pub async fn service_aliases(query: &dyn ClusterQuery, cluster: &str) -> Result<Vec<String>> {
    let mut aliases = BTreeSet::new();

    for service in query.list_services(cluster).await? {
        match query.service_tags(&service).await {
            Ok(tags) => {
                if let Some(sub) = tags.get(TAG_SUBDOMAIN).map(|s| s.trim()).filter(|s| !s.is_empty()) {
                    aliases.insert(sub.to_string());
                }
            }
            Err(e) => tracing::warn!(service = %service, "failed to read service tags: {}", e),
        }
    }

    Ok(aliases.into_iter().collect())
}
