use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::services::authz::{Action, DataScope};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn first_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl Page {
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page.clamp(1, MAX_PER_PAGE))
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * self.limit()
    }
}

/// An authorized request, handed to the entity layer.
///
/// `scope` is present for list/view and must be applied to every row returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Handoff {
    pub module: String,
    pub module_id: i64,
    pub action: Option<Action>,
    pub scope: Option<DataScope>,
    pub identity_id: i64,
    pub record_id: Option<String>,
    pub page: Page,
    pub body: Option<Value>,
}

/// The downstream entity layer behind the gate.
#[async_trait]
pub trait EntityGateway: Send + Sync {
    async fn handle(&self, handoff: Handoff) -> Result<Value, AppError>;
}
