use crate::auth::principal::Principal;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Access granted to a principal.
///
/// `records` covers structured record backup/restore and managing the
/// list itself; `stable` covers raw store size/read/write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    pub records: bool,
    pub stable: bool,
}

impl Access {
    pub fn controller() -> Self {
        Self {
            records: true,
            stable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedEntry {
    pub principal: String,
    pub records: bool,
    pub stable: bool,
}

#[derive(Debug, Default)]
pub struct AccessList {
    entries: DashMap<Principal, Access>,
}

impl AccessList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_controller(&self, principal: Principal) {
        self.entries.insert(principal, Access::controller());
    }

    pub fn grant_records(&self, principal: Principal) {
        self.entries.entry(principal).or_default().records = true;
    }

    pub fn grant_stable(&self, principal: Principal) {
        self.entries.entry(principal).or_default().stable = true;
    }

    /// Remove all access. Returns whether the principal was listed.
    pub fn revoke(&self, principal: &Principal) -> bool {
        self.entries.remove(principal).is_some()
    }

    pub fn access(&self, principal: &Principal) -> Access {
        self.entries
            .get(principal)
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }

    pub fn is_authorized(&self, principal: &Principal) -> bool {
        self.access(principal).records
    }

    pub fn is_stable_authorized(&self, principal: &Principal) -> bool {
        self.access(principal).stable
    }

    /// Entries sorted by principal
    pub fn list(&self) -> Vec<AuthorizedEntry> {
        let mut entries: Vec<(Principal, Access)> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        entries.sort_by_key(|(principal, _)| *principal);

        entries
            .into_iter()
            .map(|(principal, access)| AuthorizedEntry {
                principal: principal.to_text(),
                records: access.records,
                stable: access.stable,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
