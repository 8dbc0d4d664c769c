//! Capability checks consulted at the engine's entry points.
//!
//! The executor never checks permissions itself; by the time a run reaches it
//! the caller has been authorized (or the run is system-triggered).

use crate::config::AccessConfig;
use crate::error::{Result, RuleflowError};
use crate::types::{Actor, OrgId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageRules,
    RunRules,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::ManageRules => "manage rules",
            Capability::RunRules => "run rules",
        }
    }
}

pub trait Authorizer: Send + Sync {
    fn may_manage_rules(&self, actor: &Actor, org: &OrgId) -> bool;
    fn may_run_rules(&self, actor: &Actor, org: &OrgId) -> bool;
}

/// `Forbidden` unless `actor` holds `capability` in `org`.
pub fn require(
    authorizer: &dyn Authorizer,
    actor: &Actor,
    org: &OrgId,
    capability: Capability,
) -> Result<()> {
    let allowed = match capability {
        Capability::ManageRules => authorizer.may_manage_rules(actor, org),
        Capability::RunRules => authorizer.may_run_rules(actor, org),
    };
    if allowed {
        Ok(())
    } else {
        Err(RuleflowError::Forbidden {
            actor: actor.id().to_string(),
            org: org.to_string(),
            capability: capability.as_str(),
        })
    }
}

/// Grants everything. For embedding behind a transport that already
/// authorized the caller, and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn may_manage_rules(&self, _actor: &Actor, _org: &OrgId) -> bool {
        true
    }

    fn may_run_rules(&self, _actor: &Actor, _org: &OrgId) -> bool {
        true
    }
}

/// Managers may also run rules.
impl Authorizer for AccessConfig {
    fn may_manage_rules(&self, actor: &Actor, org: &OrgId) -> bool {
        if self.open {
            return true;
        }
        self.orgs
            .get(org.as_str())
            .is_some_and(|a| a.managers.iter().any(|m| m == actor.id()))
    }

    fn may_run_rules(&self, actor: &Actor, org: &OrgId) -> bool {
        if self.may_manage_rules(actor, org) {
            return true;
        }
        self.orgs
            .get(org.as_str())
            .is_some_and(|a| a.runners.iter().any(|r| r == actor.id()))
    }
}
