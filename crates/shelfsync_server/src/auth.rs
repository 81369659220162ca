//! Role based authorization for the sync endpoints.
//!
//! Roles form a closed set and map onto capabilities through a fixed table.
//! A principal additionally carries the stores it may act on; a platform
//! administrator reaches every store.

use crate::error::{ServerError, ServerResult};
use shelfsync_protocol::{ProtocolError, StoreId};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Operates the whole platform.
    PlatformAdmin,
    /// Administers every store of one company.
    CompanyAdmin,
    /// Administers individual stores.
    StoreAdmin,
    /// Runs day-to-day operations of a store.
    StoreManager,
    /// Read-only access to a store.
    StoreViewer,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::PlatformAdmin => "platform_admin",
            Role::CompanyAdmin => "company_admin",
            Role::StoreAdmin => "store_admin",
            Role::StoreManager => "store_manager",
            Role::StoreViewer => "store_viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "platform_admin" => Ok(Role::PlatformAdmin),
            "company_admin" => Ok(Role::CompanyAdmin),
            "store_admin" => Ok(Role::StoreAdmin),
            "store_manager" => Ok(Role::StoreManager),
            "store_viewer" => Ok(Role::StoreViewer),
            other => Err(ProtocolError::UnknownValue {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// Something a caller may do to the sync subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Read `GET /sync/status` and job records.
    ViewSyncStatus,
    /// Read `GET /sync/queue`.
    ViewSyncQueue,
    /// Start a sync cycle.
    TriggerSync,
    /// Retry or clear failed queue items.
    ManageSyncQueue,
}

/// Capability table.
pub fn is_permitted(role: Role, capability: Capability) -> bool {
    use Capability::*;

    match role {
        Role::PlatformAdmin | Role::CompanyAdmin | Role::StoreAdmin => true,
        Role::StoreManager => matches!(capability, ViewSyncStatus | ViewSyncQueue | TriggerSync),
        Role::StoreViewer => matches!(capability, ViewSyncStatus | ViewSyncQueue),
    }
}

/// Stores a principal may act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreScope {
    /// Every store.
    All,
    /// Only the listed stores.
    Only(BTreeSet<StoreId>),
}

/// The authenticated caller of a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// User id, for logs.
    pub user_id: String,
    /// Role.
    pub role: Role,
    /// Store scope.
    pub stores: StoreScope,
}

impl Principal {
    /// Creates a principal with no stores in scope.
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            stores: StoreScope::Only(BTreeSet::new()),
        }
    }

    /// Adds a store to the scope.
    pub fn with_store(mut self, store_id: impl Into<StoreId>) -> Self {
        if let StoreScope::Only(stores) = &mut self.stores {
            stores.insert(store_id.into());
        }
        self
    }

    /// Puts every store in scope.
    pub fn with_all_stores(mut self) -> Self {
        self.stores = StoreScope::All;
        self
    }

    /// Returns true if the principal may act on `store_id`.
    pub fn can_access(&self, store_id: &StoreId) -> bool {
        if self.role == Role::PlatformAdmin {
            return true;
        }
        match &self.stores {
            StoreScope::All => true,
            StoreScope::Only(stores) => stores.contains(store_id),
        }
    }
}

/// Checks `capability` and, when the request names one, the store scope.
///
/// Requests that span stores pass with the capability alone; their results
/// must be filtered with [`Principal::can_access`].
pub fn authorize(
    principal: &Principal,
    capability: Capability,
    store_id: Option<&StoreId>,
) -> ServerResult<()> {
    if !is_permitted(principal.role, capability) {
        return Err(ServerError::Forbidden(format!(
            "role {} may not {:?}",
            principal.role, capability
        )));
    }
    match store_id {
        Some(store_id) if !principal.can_access(store_id) => Err(ServerError::Forbidden(format!(
            "store {} is outside the scope of {}",
            store_id, principal.user_id
        ))),
        _ => Ok(()),
    }
}
