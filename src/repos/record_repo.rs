/*
 * Responsibility
 * - module の route_name をテーブル名とした scoped list / view
 * - private scope は owner 列 (created_by) で絞り込む
 * - それ以外の action は下流未実装 (NotImplemented)
 */
use async_trait::async_trait;
use serde_json::{Value, json};
use sqlx::PgPool;

use crate::error::AppError;
use crate::repos::error::RepoError;
use crate::services::authz::{Action, DataScope};
use crate::services::handoff::{EntityGateway, Handoff};
use crate::services::store_guard::StoreGuard;

/// Owner column every scoped module table carries.
pub const OWNER_COLUMN: &str = "created_by";

#[derive(Clone, Debug)]
pub struct PgRecordRepo {
    pool: PgPool,
    guard: StoreGuard,
}

impl PgRecordRepo {
    pub fn new(pool: PgPool, guard: StoreGuard) -> Self {
        Self { pool, guard }
    }

    async fn list(&self, table: &str, owner: Option<i64>, handoff: &Handoff) -> Result<Value, AppError> {
        let sql = format!(
            r#"
            SELECT to_jsonb(t)
            FROM {table} t
            WHERE ($1::bigint IS NULL OR t.{OWNER_COLUMN} = $1)
            ORDER BY t.id DESC
            LIMIT $2 OFFSET $3
            "#
        );

        let rows = self
            .guard
            .run("list_records", || {
                let sql = sql.as_str();
                async move {
                    let rows = sqlx::query_scalar::<_, Value>(sql)
                        .bind(owner)
                        .bind(handoff.page.limit())
                        .bind(handoff.page.offset())
                        .fetch_all(&self.pool)
                        .await?;
                    Ok::<_, RepoError>(rows)
                }
            })
            .await?;

        Ok(json!({
            "items": rows,
            "page": handoff.page.page.max(1),
            "per_page": handoff.page.limit(),
            "scope": handoff.scope,
        }))
    }

    async fn view(&self, table: &str, owner: Option<i64>, id: &str) -> Result<Value, AppError> {
        let sql = format!(
            r#"
            SELECT to_jsonb(t)
            FROM {table} t
            WHERE t.id::text = $1
                AND ($2::bigint IS NULL OR t.{OWNER_COLUMN} = $2)
            "#
        );

        let row = self
            .guard
            .run("view_record", || {
                let sql = sql.as_str();
                async move {
                    let row = sqlx::query_scalar::<_, Value>(sql)
                        .bind(id)
                        .bind(owner)
                        .fetch_optional(&self.pool)
                        .await?;
                    Ok::<_, RepoError>(row)
                }
            })
            .await?;

        row.ok_or(AppError::not_found("record"))
    }
}

#[async_trait]
impl EntityGateway for PgRecordRepo {
    async fn handle(&self, handoff: Handoff) -> Result<Value, AppError> {
        let table = quote_ident(&handoff.module);
        let owner = handoff.scope.as_ref().and_then(DataScope::owner);

        match (handoff.action, handoff.record_id.as_deref()) {
            (Some(Action::List), _) => self.list(&table, owner, &handoff).await,
            (Some(Action::View), Some(id)) => self.view(&table, owner, id).await,
            (Some(Action::View), None) => Err(AppError::bad_request(
                "MISSING_RECORD_ID",
                "record id is required",
            )),
            _ => Err(AppError::NotImplemented),
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
