//! Tiered authorization over a validated session.
//!
//! anonymous < authenticated < member (holder or delegatee) < holder.
//! Everything here is a pure function of the session payload.

use crate::models::{CapabilitySnapshot, SessionPayload, SessionTier};

/// Highest tier a session qualifies for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Anonymous,
    Authenticated,
    Member,
    Holder,
}

/// Holder or delegatee. Legacy sessions never qualify.
pub fn is_member(session: &SessionPayload) -> bool {
    session.tier == SessionTier::Agent && snapshot_is_member(&session.capabilities)
}

/// Direct owner only.
pub fn is_holder(session: &SessionPayload) -> bool {
    session.tier == SessionTier::Agent && session.capabilities.is_holder
}

pub fn snapshot_is_member(snapshot: &CapabilitySnapshot) -> bool {
    snapshot.is_holder || snapshot.is_delegated
}

pub fn tier_of(session: Option<&SessionPayload>) -> Tier {
    match session {
        None => Tier::Anonymous,
        Some(s) if is_holder(s) => Tier::Holder,
        Some(s) if is_member(s) => Tier::Member,
        Some(_) => Tier::Authenticated,
    }
}
