//! Route → action table.
//!
//! Entity routes are declared once as `{verb, pattern} → rule`. The table is
//! validated when it is built (startup), and the same table drives router
//! construction, so every served entity route carries its rule statically and
//! nothing is derived from URL substrings at request time.

use std::collections::HashSet;

use axum::http::Method;
use axum::routing::MethodFilter;
use serde::Serialize;
use thiserror::Error;

/// Path parameter holding the module route name.
pub const MODULE_PARAM: &str = "module";

const MODULE_PREFIX: &str = "/{module}";

/// Per-action privilege flags of a profile privilege row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    List,
    View,
    Create,
    /// Also covers status changes.
    Edit,
    Delete,
    Print,
    Clone,
    Export,
}

impl Action {
    /// Read actions are subject to data scope resolution.
    pub fn is_read(self) -> bool {
        matches!(self, Action::List | Action::View)
    }
}

/// What a route requires beyond module-level access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionRule {
    Requires(Action),
    /// Explicitly whitelisted: a privilege row for the module is enough.
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRoute {
    pub method: Method,
    pub pattern: &'static str,
    pub rule: ActionRule,
}

impl EntityRoute {
    pub fn new(method: Method, pattern: &'static str, rule: ActionRule) -> Self {
        Self {
            method,
            pattern,
            rule,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("duplicate entity route {method} {pattern}")]
    Duplicate { method: Method, pattern: String },

    #[error("entity route must start with /{{module}}: {0}")]
    MissingModuleSegment(String),

    #[error("unsupported method for entity route: {0}")]
    UnsupportedMethod(Method),

    #[error("invalid module route name: {0:?}")]
    InvalidModuleName(String),
}

/// Validated, immutable set of entity routes.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<EntityRoute>,
    filters: Vec<MethodFilter>,
}

impl RouteTable {
    pub fn new(routes: Vec<EntityRoute>) -> Result<Self, RegistrationError> {
        let mut seen = HashSet::new();
        let mut filters = Vec::with_capacity(routes.len());

        for route in &routes {
            let rest = route
                .pattern
                .strip_prefix(MODULE_PREFIX)
                .ok_or_else(|| RegistrationError::MissingModuleSegment(route.pattern.to_string()))?;
            if !(rest.is_empty() || rest.starts_with('/')) {
                return Err(RegistrationError::MissingModuleSegment(
                    route.pattern.to_string(),
                ));
            }

            let filter = MethodFilter::try_from(route.method.clone())
                .map_err(|_| RegistrationError::UnsupportedMethod(route.method.clone()))?;

            if !seen.insert((route.method.clone(), route.pattern)) {
                return Err(RegistrationError::Duplicate {
                    method: route.method.clone(),
                    pattern: route.pattern.to_string(),
                });
            }
            filters.push(filter);
        }

        Ok(Self { routes, filters })
    }

    /// The standard entity surface: one route per action, status change mapped to edit.
    pub fn standard() -> Result<Self, RegistrationError> {
        use ActionRule::Requires;

        Self::new(vec![
            EntityRoute::new(Method::POST, "/{module}/list", Requires(Action::List)),
            EntityRoute::new(Method::GET, "/{module}/view/{id}", Requires(Action::View)),
            EntityRoute::new(Method::POST, "/{module}/create", Requires(Action::Create)),
            EntityRoute::new(Method::PUT, "/{module}/update/{id}", Requires(Action::Edit)),
            EntityRoute::new(Method::PATCH, "/{module}/status/{id}", Requires(Action::Edit)),
            EntityRoute::new(Method::DELETE, "/{module}/delete/{id}", Requires(Action::Delete)),
            EntityRoute::new(Method::GET, "/{module}/print/{id}", Requires(Action::Print)),
            EntityRoute::new(Method::POST, "/{module}/clone/{id}", Requires(Action::Clone)),
            EntityRoute::new(Method::POST, "/{module}/export", Requires(Action::Export)),
        ])
    }

    pub fn routes(&self) -> &[EntityRoute] {
        &self.routes
    }

    /// Routes paired with the method filter they are mounted under.
    pub fn entries(&self) -> impl Iterator<Item = (MethodFilter, &EntityRoute)> {
        self.filters.iter().copied().zip(&self.routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_maps_every_action() {
        let table = RouteTable::standard().unwrap();
        let actions: HashSet<Action> = table
            .routes()
            .iter()
            .filter_map(|r| match r.rule {
                ActionRule::Requires(a) => Some(a),
                ActionRule::Open => None,
            })
            .collect();

        assert_eq!(actions.len(), 8);
    }

    #[test]
    fn status_change_requires_edit() {
        let table = RouteTable::standard().unwrap();
        let status = table
            .routes()
            .iter()
            .find(|r| r.pattern == "/{module}/status/{id}")
            .unwrap();

        assert_eq!(status.method, Method::PATCH);
        assert_eq!(status.rule, ActionRule::Requires(Action::Edit));
    }

    #[test]
    fn duplicate_verb_and_pattern_is_rejected() {
        let err = RouteTable::new(vec![
            EntityRoute::new(Method::GET, "/{module}/view/{id}", ActionRule::Requires(Action::View)),
            EntityRoute::new(Method::GET, "/{module}/view/{id}", ActionRule::Open),
        ])
        .unwrap_err();

        assert!(matches!(err, RegistrationError::Duplicate { .. }));
    }

    #[test]
    fn same_pattern_with_another_verb_is_allowed() {
        RouteTable::new(vec![
            EntityRoute::new(Method::GET, "/{module}/item/{id}", ActionRule::Requires(Action::View)),
            EntityRoute::new(Method::PUT, "/{module}/item/{id}", ActionRule::Requires(Action::Edit)),
        ])
        .unwrap();
    }

    #[test]
    fn pattern_without_module_segment_is_rejected() {
        for pattern in ["/products/list", "/{module}list", "/{id}/{module}"] {
            let err = RouteTable::new(vec![EntityRoute::new(
                Method::POST,
                pattern,
                ActionRule::Requires(Action::List),
            )])
            .unwrap_err();

            assert_eq!(err, RegistrationError::MissingModuleSegment(pattern.to_string()));
        }
    }

    #[test]
    fn read_actions() {
        assert!(Action::List.is_read());
        assert!(Action::View.is_read());
        assert!(!Action::Export.is_read());
        assert!(!Action::Edit.is_read());
    }
}
