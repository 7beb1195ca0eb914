//! Capability checks and the emergency pause
//!
//! Role administration lives outside the protocol core. Components only ask
//! "may `who` perform `action` at `now`?" through [`AccessControl`] and
//! "is the protocol halted?" through [`PauseGuard`]; both are injected.

use crate::error::{HalomError, Result};
use crate::types::{AccountId, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Actions gated by the access-control collaborator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Submit a feed value to an open round
    SubmitFeed,
    /// Advance the published index
    PublishIndex,
    /// Open consensus rounds
    ManageRounds,
}

/// Capability lookup supplied by the governance / role layer
pub trait AccessControl: Send + Sync {
    fn has_capability(&self, who: &AccountId, action: Capability, now: Timestamp) -> bool;
}

/// Emergency pause supplied by the governance layer
pub trait PauseGuard: Send + Sync {
    fn is_paused(&self) -> bool;
}

/// A single capability grant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub granted_at: Timestamp,
    /// Time-limited grants stop working at this instant
    pub expires_at: Option<Timestamp>,
    pub revoked_at: Option<Timestamp>,
}

impl Grant {
    pub fn is_active(&self, now: Timestamp) -> bool {
        if now < self.granted_at {
            return false;
        }
        if matches!(self.revoked_at, Some(revoked) if now >= revoked) {
            return false;
        }
        !matches!(self.expires_at, Some(expiry) if now >= expiry)
    }
}

/// In-memory capability table with time-limited grants and revocation stamps
#[derive(Default)]
pub struct CapabilityTable {
    grants: RwLock<HashMap<(AccountId, Capability), Grant>>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant without expiry
    pub fn grant(&self, who: AccountId, action: Capability, now: Timestamp) {
        self.grant_until(who, action, now, None);
    }

    pub fn grant_until(
        &self,
        who: AccountId,
        action: Capability,
        now: Timestamp,
        expires_at: Option<Timestamp>,
    ) {
        self.grants.write().insert(
            (who, action),
            Grant {
                granted_at: now,
                expires_at,
                revoked_at: None,
            },
        );
    }

    /// Revoke; the record is kept so the revocation time stays auditable
    pub fn revoke(&self, who: &AccountId, action: Capability, now: Timestamp) -> bool {
        match self.grants.write().get_mut(&(*who, action)) {
            Some(grant) if grant.revoked_at.is_none() => {
                grant.revoked_at = Some(now);
                true
            }
            _ => false,
        }
    }

    pub fn grant_record(&self, who: &AccountId, action: Capability) -> Option<Grant> {
        self.grants.read().get(&(*who, action)).cloned()
    }

    /// Accounts currently holding `action`
    pub fn holders(&self, action: Capability, now: Timestamp) -> Vec<AccountId> {
        let mut holders: Vec<AccountId> = self
            .grants
            .read()
            .iter()
            .filter(|((_, cap), grant)| *cap == action && grant.is_active(now))
            .map(|((who, _), _)| *who)
            .collect();
        holders.sort();
        holders
    }
}

impl AccessControl for CapabilityTable {
    fn has_capability(&self, who: &AccountId, action: Capability, now: Timestamp) -> bool {
        self.grants
            .read()
            .get(&(*who, action))
            .map(|grant| grant.is_active(now))
            .unwrap_or(false)
    }
}

/// Atomic pause flag
#[derive(Debug, Default)]
pub struct EmergencySwitch {
    paused: AtomicBool,
}

impl EmergencySwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn unpause(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }
}

impl PauseGuard for EmergencySwitch {
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// Caller identity, time and injected guards for one protocol call
#[derive(Clone, Copy)]
pub struct CallContext<'a> {
    pub caller: AccountId,
    pub now: Timestamp,
    access: &'a dyn AccessControl,
    pause: &'a dyn PauseGuard,
}

impl<'a> CallContext<'a> {
    pub fn new(
        caller: AccountId,
        now: Timestamp,
        access: &'a dyn AccessControl,
        pause: &'a dyn PauseGuard,
    ) -> Self {
        Self {
            caller,
            now,
            access,
            pause,
        }
    }

    /// Fail with `ContractPaused` while the emergency switch is on
    pub fn ensure_active(&self) -> Result<()> {
        if self.pause.is_paused() {
            return Err(HalomError::ContractPaused);
        }
        Ok(())
    }

    /// Fail with `Unauthorized` unless `who` holds `action`
    pub fn require_for(&self, who: &AccountId, action: Capability) -> Result<()> {
        if !self.access.has_capability(who, action, self.now) {
            return Err(HalomError::Unauthorized(*who));
        }
        Ok(())
    }

    /// Fail with `Unauthorized` unless the caller holds `action`
    pub fn require(&self, action: Capability) -> Result<()> {
        self.require_for(&self.caller, action)
    }

    /// Same call, different caller
    pub fn with_caller(&self, caller: AccountId) -> Self {
        Self { caller, ..*self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_and_revoke() {
        let table = CapabilityTable::new();
        let reporter = AccountId::from_label("reporter-1");

        table.grant(reporter, Capability::SubmitFeed, 100);
        assert!(table.has_capability(&reporter, Capability::SubmitFeed, 100));
        assert!(!table.has_capability(&reporter, Capability::SubmitFeed, 99));
        assert!(!table.has_capability(&reporter, Capability::PublishIndex, 100));

        assert!(table.revoke(&reporter, Capability::SubmitFeed, 200));
        assert!(table.has_capability(&reporter, Capability::SubmitFeed, 199));
        assert!(!table.has_capability(&reporter, Capability::SubmitFeed, 200));
        assert!(!table.revoke(&reporter, Capability::SubmitFeed, 300));

        let record = table.grant_record(&reporter, Capability::SubmitFeed).unwrap();
        assert_eq!(record.revoked_at, Some(200));
    }

    #[test]
    fn test_time_limited_grant() {
        let table = CapabilityTable::new();
        let updater = AccountId::from_label("updater");

        table.grant_until(updater, Capability::PublishIndex, 0, Some(3600));
        assert!(table.has_capability(&updater, Capability::PublishIndex, 3599));
        assert!(!table.has_capability(&updater, Capability::PublishIndex, 3600));
        assert!(table.holders(Capability::PublishIndex, 4000).is_empty());
    }

    #[test]
    fn test_call_context_guards() {
        let table = CapabilityTable::new();
        let switch = EmergencySwitch::new();
        let who = AccountId::from_label("updater");
        table.grant(who, Capability::PublishIndex, 0);

        let ctx = CallContext::new(who, 10, &table, &switch);
        assert!(ctx.ensure_active().is_ok());
        assert!(ctx.require(Capability::PublishIndex).is_ok());
        assert_eq!(
            ctx.require(Capability::SubmitFeed),
            Err(HalomError::Unauthorized(who))
        );

        switch.pause();
        assert_eq!(ctx.ensure_active(), Err(HalomError::ContractPaused));
        switch.unpause();
        assert!(ctx.ensure_active().is_ok());
    }
}
