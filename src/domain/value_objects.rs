//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport protocol of a service listener.
///
/// Ordering is significant: rendered configuration lists TCP listeners
/// before UDP listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Parse a protocol tag value. Only `tcp` and `udp` are accepted.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of a DNS record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordType {
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
    #[serde(rename = "CNAME")]
    Cname,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the three record sets published for the proxy fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FleetRecord {
    /// Public IPv4 addresses under the fleet name
    PublicV4,
    /// Public IPv6 addresses under the fleet name
    PublicV6,
    /// Private IPv4 addresses under the internal fleet name
    PrivateV4,
}

impl FleetRecord {
    pub const ALL: [FleetRecord; 3] = [Self::PublicV4, Self::PublicV6, Self::PrivateV4];

    pub fn record_type(&self) -> RecordType {
        match self {
            Self::PublicV4 | Self::PrivateV4 => RecordType::A,
            Self::PublicV6 => RecordType::Aaaa,
        }
    }
}

impl fmt::Display for FleetRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PublicV4 => "public-v4",
            Self::PublicV6 => "public-v6",
            Self::PrivateV4 => "private-v4",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a scaling-group member, as reported by the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Pending,
    #[serde(rename = "Pending:Wait")]
    PendingWait,
    #[serde(rename = "Pending:Proceed")]
    PendingProceed,
    InService,
    Terminating,
    #[serde(rename = "Terminating:Wait")]
    TerminatingWait,
    #[serde(rename = "Terminating:Proceed")]
    TerminatingProceed,
    Terminated,
    #[serde(other)]
    Other,
}

impl LifecycleState {
    /// Whether a member in this state belongs in the published fleet.
    ///
    /// `Pending:Proceed` members have had their launch hook acknowledged
    /// and are on their way to `InService`.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::InService | Self::PendingProceed)
    }
}

/// Lifecycle transition carried by a scaling-group notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleTransition {
    Launching,
    Terminating,
    Unknown(String),
}

impl LifecycleTransition {
    pub fn parse(s: &str) -> Self {
        match s {
            "autoscaling:EC2_INSTANCE_LAUNCHING" => Self::Launching,
            "autoscaling:EC2_INSTANCE_TERMINATING" => Self::Terminating,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for LifecycleTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Launching => f.write_str("autoscaling:EC2_INSTANCE_LAUNCHING"),
            Self::Terminating => f.write_str("autoscaling:EC2_INSTANCE_TERMINATING"),
            Self::Unknown(s) => f.write_str(s),
        }
    }
}

/// Result reported when completing a lifecycle hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LifecycleActionResult {
    Continue,
    Abandon,
}

/// Phase of a proxy node as seen by the scaling-lifecycle reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePhase {
    Pending,
    HealthChecking,
    Registered,
    Draining,
    Removed,
}

/// Status of a remote command invocation on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvocationStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Cancelled,
    TimedOut,
}

impl InvocationStatus {
    /// Terminal statuses end the completion poll for a node.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::InProgress)
    }
}

/// Hosted DNS zone, e.g. `example.org`.
///
/// Every name the reconcilers publish must sit inside this zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneName(String);

impl ZoneName {
    pub fn new(name: &str) -> Self {
        Self(normalize_name(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `fqdn` equals the zone apex or is a name below it.
    pub fn contains(&self, fqdn: &str) -> bool {
        let fqdn = normalize_name(fqdn);
        fqdn == self.0 || fqdn.ends_with(&format!(".{}", self.0))
    }
}

impl fmt::Display for ZoneName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Join a subdomain onto a domain; `@` names the domain itself.
pub fn subdomain_to_fqdn(subdomain: &str, domain: &str) -> String {
    let domain = normalize_name(domain);
    match subdomain.trim() {
        "@" | "" => domain,
        sub => format!("{}.{}", normalize_name(sub), domain),
    }
}

/// Lowercase and strip the trailing root dot.
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_lowercase()
}
