//! Fleet Membership Service
//!
//! Computes the complete address sets to publish for the proxy fleet.
//! Every call recomputes from the roster; nothing is patched incrementally.

use crate::domain::entities::{FleetAddresses, ProxyNode};

/// Adjustment applied to the roster for the node that triggered an event.
///
/// The scaling group's roster may lag behind the event: a launching node
/// is not yet admitted, a terminating node may still be listed.
#[derive(Debug, Clone, Copy)]
pub enum MembershipOverride<'a> {
    None,
    /// Count this node as a member even if the roster does not
    Include(&'a ProxyNode),
    /// Leave this instance out even if the roster lists it
    Exclude(&'a str),
}

pub struct Membership;

impl Membership {
    /// Address sets across all admitted members, adjusted by `adjust`.
    ///
    /// The roster itself is never modified.
    pub fn fleet_addresses(members: &[ProxyNode], adjust: MembershipOverride<'_>) -> FleetAddresses {
        let mut fleet = FleetAddresses::default();

        for member in members.iter().filter(|m| m.lifecycle_state.is_admitted()) {
            match adjust {
                MembershipOverride::Exclude(id) if member.instance_id == id => continue,
                // The override's copy wins over a possibly stale roster entry
                MembershipOverride::Include(node) if member.instance_id == node.instance_id => continue,
                _ => fleet.add_node(member),
            }
        }

        if let MembershipOverride::Include(node) = adjust {
            fleet.add_node(node);
        }

        fleet
    }
}
