use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;
use crate::repos::privilege_repo::{ModuleRow, PrivilegeStore};
use crate::services::store_guard::StoreGuard;

/// Which rows of a module a read may return.
///
/// Serialized as `{"type":"public"}` or `{"type":"private","ownerId":42}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataScope {
    Public,
    Private {
        #[serde(rename = "ownerId")]
        owner_id: i64,
    },
}

impl DataScope {
    /// Owner filter to apply, if any.
    pub fn owner(&self) -> Option<i64> {
        match self {
            DataScope::Public => None,
            DataScope::Private { owner_id } => Some(*owner_id),
        }
    }

    #[cfg(test)]
    pub fn permits(&self, row_owner: i64) -> bool {
        self.owner().is_none_or(|owner| owner == row_owner)
    }
}

/// Resolves the data scope of list/view requests from `role_data_access`.
pub struct DataScopeResolver {
    store: Arc<dyn PrivilegeStore>,
    guard: StoreGuard,
}

impl DataScopeResolver {
    pub fn new(store: Arc<dyn PrivilegeStore>, guard: StoreGuard) -> Self {
        Self { store, guard }
    }

    /// `private` scopes to `identity_id`, `public` is unrestricted, anything else denies.
    pub async fn resolve(
        &self,
        role_id: i64,
        module: &ModuleRow,
        identity_id: i64,
    ) -> Result<DataScope, AppError> {
        let value = self
            .guard
            .run("role_data_access", || {
                self.store.role_data_access(role_id, module.id)
            })
            .await?;

        match value.as_deref().map(str::trim) {
            Some("public") => Ok(DataScope::Public),
            Some("private") => Ok(DataScope::Private {
                owner_id: identity_id,
            }),
            other => {
                debug!(role_id, module_id = module.id, value = ?other, "data access denied");
                Err(AppError::NoDataAccess)
            }
        }
    }
}
