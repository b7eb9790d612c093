/*
 * Responsibility
 * - modules / profile_privileges / role_data_access の読み取り
 * - Role → Profile → ProfilePrivilege の join はここで閉じる
 */
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use crate::repos::error::RepoResult;

#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct ModuleRow {
    pub id: i64,
    pub route_name: String,
    pub active: bool,
}

/// One (profile, module) privilege row.
#[derive(Debug, Clone, Default, FromRow, PartialEq, Eq)]
pub struct PrivilegeRow {
    pub fullgrantaccess: bool,
    pub createaccess: bool,
    pub editaccess: bool,
    pub deleteaccess: bool,
    pub listaccess: bool,
    pub viewaccess: bool,
    pub printaccess: bool,
    pub cloneaccess: bool,
    pub exportaccess: bool,
}

#[async_trait]
pub trait PrivilegeStore: Send + Sync {
    async fn active_modules(&self) -> RepoResult<Vec<ModuleRow>>;

    async fn profile_privilege(&self, role_id: i64, module_id: i64)
    -> RepoResult<Option<PrivilegeRow>>;

    /// Raw `listaccess` value of `role_data_access`, if a row exists.
    async fn role_data_access(&self, role_id: i64, module_id: i64) -> RepoResult<Option<String>>;
}

#[derive(Clone, Debug)]
pub struct PgPrivilegeRepo {
    pool: PgPool,
}

impl PgPrivilegeRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrivilegeStore for PgPrivilegeRepo {
    async fn active_modules(&self) -> RepoResult<Vec<ModuleRow>> {
        let rows = sqlx::query_as::<_, ModuleRow>(
            r#"
            SELECT id, route_name, active
            FROM modules
            WHERE active
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn profile_privilege(
        &self,
        role_id: i64,
        module_id: i64,
    ) -> RepoResult<Option<PrivilegeRow>> {
        let row = sqlx::query_as::<_, PrivilegeRow>(
            r#"
            SELECT
                pp.fullgrantaccess,
                pp.createaccess,
                pp.editaccess,
                pp.deleteaccess,
                pp.listaccess,
                pp.viewaccess,
                pp.printaccess,
                pp.cloneaccess,
                pp.exportaccess
            FROM roles r
            JOIN profiles p ON p.id = r.profile_id
            JOIN profile_privileges pp ON pp.profile_id = p.id
            WHERE r.id = $1
                AND pp.module_id = $2
            "#,
        )
        .bind(role_id)
        .bind(module_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn role_data_access(&self, role_id: i64, module_id: i64) -> RepoResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            r#"
            SELECT listaccess
            FROM role_data_access
            WHERE role_id = $1
                AND module_id = $2
            "#,
        )
        .bind(role_id)
        .bind(module_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::fixtures::{ROLE_ID, seed_identity};

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires postgres"]
    async fn privileges_resolve_through_role_and_profile(pool: PgPool) {
        seed_identity(&pool, 42).await;
        sqlx::query(
            "INSERT INTO modules (id, route_name, active) VALUES (1, 'products', TRUE), (2, 'archive', FALSE)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO profile_privileges (profile_id, module_id, listaccess) VALUES (1, 1, TRUE)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO role_data_access (role_id, module_id, listaccess) VALUES ($1, 1, 'private')")
            .bind(ROLE_ID)
            .execute(&pool)
            .await
            .unwrap();
        let repo = PgPrivilegeRepo::new(pool);

        let modules = repo.active_modules().await.unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].route_name, "products");

        let row = repo.profile_privilege(ROLE_ID, 1).await.unwrap().unwrap();
        assert!(row.listaccess);
        assert!(!row.fullgrantaccess && !row.deleteaccess);
        assert_eq!(repo.profile_privilege(ROLE_ID, 2).await.unwrap(), None);

        assert_eq!(
            repo.role_data_access(ROLE_ID, 1).await.unwrap().as_deref(),
            Some("private")
        );
        assert_eq!(repo.role_data_access(ROLE_ID, 2).await.unwrap(), None);
    }
}
