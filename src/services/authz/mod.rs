/*
 * Responsibility
 * - module 単位の権限 (profile privilege) と action 単位の flag 判定
 * - list/view の data scope (public / private) 解決
 * - route → action の対応表 (startup で検証)
 */
pub mod privilege;
pub mod routes;
pub mod scope;

pub use privilege::{ModuleRegistry, PrivilegeResolver};
pub use routes::{Action, ActionRule, RouteTable};
pub use scope::{DataScope, DataScopeResolver};
