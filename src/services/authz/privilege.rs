use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::AppError;
use crate::repos::privilege_repo::{ModuleRow, PrivilegeRow, PrivilegeStore};
use crate::services::authz::routes::{Action, ActionRule, RegistrationError};
use crate::services::store_guard::StoreGuard;

/// Active modules keyed by their route name, loaded once at startup.
///
/// Route names double as table names for the record gateway, so only
/// lowercase identifiers are accepted.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    by_route: HashMap<String, ModuleRow>,
}

impl ModuleRegistry {
    pub fn new(rows: Vec<ModuleRow>) -> Result<Self, RegistrationError> {
        let mut by_route = HashMap::with_capacity(rows.len());

        for row in rows.into_iter().filter(|r| r.active) {
            if !is_route_name(&row.route_name) {
                return Err(RegistrationError::InvalidModuleName(row.route_name));
            }
            by_route.insert(row.route_name.clone(), row);
        }

        Ok(Self { by_route })
    }

    pub fn resolve(&self, route_name: &str) -> Option<&ModuleRow> {
        self.by_route.get(route_name)
    }

    pub fn len(&self) -> usize {
        self.by_route.len()
    }
}

fn is_route_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= 63
}

/// A module-level permission that passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeDecision {
    pub module: ModuleRow,
    /// `None` for routes whitelisted as open.
    pub action: Option<Action>,
}

pub struct PrivilegeResolver {
    modules: ModuleRegistry,
    store: Arc<dyn PrivilegeStore>,
    guard: StoreGuard,
}

impl PrivilegeResolver {
    pub fn new(modules: ModuleRegistry, store: Arc<dyn PrivilegeStore>, guard: StoreGuard) -> Self {
        Self {
            modules,
            store,
            guard,
        }
    }

    /// Module lookup, then the role's profile privilege row, then the route's action flag.
    ///
    /// An unknown module is rejected before any privilege lookup.
    pub async fn resolve(
        &self,
        role_id: i64,
        route_name: &str,
        rule: ActionRule,
    ) -> Result<PrivilegeDecision, AppError> {
        let Some(module) = self.modules.resolve(route_name).cloned() else {
            debug!(route_name, "module not registered");
            return Err(AppError::ModuleNotRegistered);
        };

        let privilege = self
            .guard
            .run("profile_privilege", || {
                self.store.profile_privilege(role_id, module.id)
            })
            .await?
            .ok_or_else(|| {
                debug!(role_id, module_id = module.id, "no privilege row for module");
                AppError::NoModulePermission
            })?;

        let action = match rule {
            ActionRule::Open => None,
            ActionRule::Requires(action) => {
                if !permits(&privilege, action) {
                    debug!(role_id, module_id = module.id, ?action, "action not granted");
                    return Err(AppError::NoModulePermission);
                }
                Some(action)
            }
        };

        Ok(PrivilegeDecision { module, action })
    }
}

fn permits(row: &PrivilegeRow, action: Action) -> bool {
    row.fullgrantaccess
        || match action {
            Action::List => row.listaccess,
            Action::View => row.viewaccess,
            Action::Create => row.createaccess,
            Action::Edit => row.editaccess,
            Action::Delete => row.deleteaccess,
            Action::Print => row.printaccess,
            Action::Clone => row.cloneaccess,
            Action::Export => row.exportaccess,
        }
}
