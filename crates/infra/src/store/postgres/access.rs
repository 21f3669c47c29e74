//! Modules, features, roles and users.

use async_trait::async_trait;
use tracing::{Span, instrument};

use eproc_core::{FeatureId, ListQuery, ModuleId, RoleId, UserId};

use super::*;
use crate::store::{FeatureStore, ModuleStore, RoleStore, StoreResult, UserStore};

#[async_trait]
impl ModuleStore for PostgresStore {
    #[instrument(
        skip(self),
        fields(operation = "list_modules", row_count = tracing::field::Empty),
        err
    )]
    async fn list(&self, query: ListQuery) -> StoreResult<Listing<ModuleRecord>> {
        let (limit, offset) = window(&query);
        let sql = format!(
            "SELECT {MODULE_COLUMNS} FROM usr_modules WHERE deleted_at IS NULL \
             ORDER BY {} LIMIT $1 OFFSET $2",
            query.ordering.sql()
        );
        let rows = sqlx::query_as::<_, ModuleRecord>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_modules", e))?;
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM usr_modules WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("count_modules", e))?;
        Span::current().record("row_count", rows.len());
        Ok(Listing {
            rows,
            total: total(count),
        })
    }

    #[instrument(skip(self), fields(module_id = %id), err)]
    async fn get(&self, id: ModuleId) -> StoreResult<Option<ModuleRecord>> {
        sqlx::query_as::<_, ModuleRecord>(&format!(
            "SELECT {MODULE_COLUMNS} FROM usr_modules WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_module", e))
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<ModuleRecord>> {
        sqlx::query_as::<_, ModuleRecord>(&format!(
            "SELECT {MODULE_COLUMNS} FROM usr_modules WHERE name = $1 AND deleted_at IS NULL"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_module_by_name", e))
    }

    async fn children(&self, id: ModuleId) -> StoreResult<Vec<ModuleRecord>> {
        sqlx::query_as::<_, ModuleRecord>(&format!(
            "SELECT {MODULE_COLUMNS} FROM usr_modules \
             WHERE parent_id = $1 AND deleted_at IS NULL ORDER BY id"
        ))
        .bind(id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("module_children", e))
    }

    #[instrument(skip(self), fields(name = %input.name), err)]
    async fn create(&self, input: ModuleInput) -> StoreResult<ModuleRecord> {
        sqlx::query_as::<_, ModuleRecord>(&format!(
            "INSERT INTO usr_modules (name, parent_id) VALUES ($1, $2) RETURNING {MODULE_COLUMNS}"
        ))
        .bind(&input.name)
        .bind(input.parent_id.map(ModuleId::get))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_module", e))
    }

    #[instrument(skip(self), fields(module_id = %id), err)]
    async fn update(&self, id: ModuleId, input: ModuleInput) -> StoreResult<ModuleRecord> {
        sqlx::query_as::<_, ModuleRecord>(&format!(
            "UPDATE usr_modules SET name = $2, parent_id = $3, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {MODULE_COLUMNS}"
        ))
        .bind(id.get())
        .bind(&input.name)
        .bind(input.parent_id.map(ModuleId::get))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_module", e))?
        .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self), fields(module_id = %id), err)]
    async fn delete(&self, id: ModuleId) -> StoreResult<()> {
        soft_delete(&self.pool, "usr_modules", id.get()).await
    }
}

#[async_trait]
impl FeatureStore for PostgresStore {
    #[instrument(skip(self), fields(operation = "list_features"), err)]
    async fn list(
        &self,
        filter: FeatureFilter,
        query: ListQuery,
    ) -> StoreResult<Listing<FeatureRecord>> {
        let (limit, offset) = window(&query);
        let module_id = filter.module_id.map(ModuleId::get);
        let sql = format!(
            "SELECT {FEATURE_COLUMNS} FROM usr_features \
             WHERE deleted_at IS NULL AND ($1::BIGINT IS NULL OR module_id = $1) \
             ORDER BY {} LIMIT $2 OFFSET $3",
            query.ordering.sql()
        );
        let rows = sqlx::query_as::<_, FeatureRecord>(&sql)
            .bind(module_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_features", e))?;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM usr_features \
             WHERE deleted_at IS NULL AND ($1::BIGINT IS NULL OR module_id = $1)",
        )
        .bind(module_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_features", e))?;
        Ok(Listing {
            rows,
            total: total(count),
        })
    }

    #[instrument(skip(self), fields(feature_id = %id), err)]
    async fn get(&self, id: FeatureId) -> StoreResult<Option<FeatureRecord>> {
        sqlx::query_as::<_, FeatureRecord>(&format!(
            "SELECT {FEATURE_COLUMNS} FROM usr_features WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_feature", e))
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<FeatureRecord>> {
        sqlx::query_as::<_, FeatureRecord>(&format!(
            "SELECT {FEATURE_COLUMNS} FROM usr_features WHERE name = $1 AND deleted_at IS NULL"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_feature_by_name", e))
    }

    async fn get_many(&self, ids: &[FeatureId]) -> StoreResult<Vec<FeatureRecord>> {
        let ids: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        sqlx::query_as::<_, FeatureRecord>(&format!(
            "SELECT {FEATURE_COLUMNS} FROM usr_features \
             WHERE id = ANY($1) AND deleted_at IS NULL ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_many_features", e))
    }

    async fn by_module(&self, module_id: ModuleId) -> StoreResult<Vec<FeatureRecord>> {
        sqlx::query_as::<_, FeatureRecord>(&format!(
            "SELECT {FEATURE_COLUMNS} FROM usr_features \
             WHERE module_id = $1 AND deleted_at IS NULL ORDER BY id"
        ))
        .bind(module_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("features_by_module", e))
    }

    async fn is_granted(&self, id: FeatureId) -> StoreResult<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS ( \
                SELECT 1 FROM usr_role_features rf \
                JOIN usr_roles r ON r.id = rf.role_id \
                WHERE rf.feature_id = $1 AND r.deleted_at IS NULL)",
        )
        .bind(id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("feature_is_granted", e))
    }

    #[instrument(skip(self), fields(name = %input.name), err)]
    async fn create(&self, input: FeatureInput) -> StoreResult<FeatureRecord> {
        sqlx::query_as::<_, FeatureRecord>(&format!(
            "INSERT INTO usr_features (name, module_id) VALUES ($1, $2) RETURNING {FEATURE_COLUMNS}"
        ))
        .bind(&input.name)
        .bind(input.module_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_feature", e))
    }

    #[instrument(skip(self), fields(feature_id = %id), err)]
    async fn update(&self, id: FeatureId, input: FeatureInput) -> StoreResult<FeatureRecord> {
        sqlx::query_as::<_, FeatureRecord>(&format!(
            "UPDATE usr_features SET name = $2, module_id = $3, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {FEATURE_COLUMNS}"
        ))
        .bind(id.get())
        .bind(&input.name)
        .bind(input.module_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_feature", e))?
        .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self), fields(feature_id = %id), err)]
    async fn delete(&self, id: FeatureId) -> StoreResult<()> {
        soft_delete(&self.pool, "usr_features", id.get()).await
    }
}

#[async_trait]
impl RoleStore for PostgresStore {
    #[instrument(skip(self), fields(operation = "list_roles"), err)]
    async fn list(&self, query: ListQuery) -> StoreResult<Listing<RoleRecord>> {
        let (limit, offset) = window(&query);
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM usr_roles WHERE deleted_at IS NULL \
             ORDER BY {} LIMIT $1 OFFSET $2",
            query.ordering.sql()
        );
        let rows = sqlx::query_as::<_, RoleRecord>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM usr_roles WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("count_roles", e))?;
        Ok(Listing {
            rows,
            total: total(count),
        })
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn get(&self, id: RoleId) -> StoreResult<Option<RoleRecord>> {
        sqlx::query_as::<_, RoleRecord>(&format!(
            "SELECT {ROLE_COLUMNS} FROM usr_roles WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_role", e))
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<RoleRecord>> {
        sqlx::query_as::<_, RoleRecord>(&format!(
            "SELECT {ROLE_COLUMNS} FROM usr_roles WHERE name = $1 AND deleted_at IS NULL"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_role_by_name", e))
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn features(&self, id: RoleId) -> StoreResult<Vec<FeatureRecord>> {
        sqlx::query_as::<_, FeatureRecord>(
            "SELECT f.id, f.name, f.module_id, f.created_at, f.updated_at \
             FROM usr_features f \
             JOIN usr_role_features rf ON rf.feature_id = f.id \
             WHERE rf.role_id = $1 AND f.deleted_at IS NULL \
             ORDER BY f.id",
        )
        .bind(id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("role_features", e))
    }

    #[instrument(
        skip(self),
        fields(name = %input.name, feature_count = input.features.len()),
        err
    )]
    async fn create(&self, input: RoleInput) -> StoreResult<RoleRecord> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_create_role", e))?;

        let role = sqlx::query_as::<_, RoleRecord>(&format!(
            "INSERT INTO usr_roles (name, is_administrative) VALUES ($1, $2) RETURNING {ROLE_COLUMNS}"
        ))
        .bind(&input.name)
        .bind(input.is_administrative)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_role", e))?;

        grant_features(&mut tx, role.id, &input.features).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_create_role", e))?;
        Ok(role)
    }

    #[instrument(
        skip(self),
        fields(role_id = %id, feature_count = input.features.len()),
        err
    )]
    async fn update(&self, id: RoleId, input: RoleInput) -> StoreResult<RoleRecord> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_update_role", e))?;

        let role = sqlx::query_as::<_, RoleRecord>(&format!(
            "UPDATE usr_roles SET name = $2, is_administrative = $3, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {ROLE_COLUMNS}"
        ))
        .bind(id.get())
        .bind(&input.name)
        .bind(input.is_administrative)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_role", e))?
        .ok_or(StoreError::NotFound)?;

        sqlx::query("DELETE FROM usr_role_features WHERE role_id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("clear_role_features", e))?;

        grant_features(&mut tx, id, &input.features).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_update_role", e))?;
        Ok(role)
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn delete(&self, id: RoleId) -> StoreResult<()> {
        soft_delete(&self.pool, "usr_roles", id.get()).await
    }
}

async fn grant_features(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    role_id: RoleId,
    features: &[FeatureId],
) -> StoreResult<()> {
    if features.is_empty() {
        return Ok(());
    }
    let ids: Vec<i64> = features.iter().map(|id| id.get()).collect();
    sqlx::query(
        "INSERT INTO usr_role_features (role_id, feature_id) \
         SELECT $1, f FROM UNNEST($2::BIGINT[]) AS f \
         ON CONFLICT DO NOTHING",
    )
    .bind(role_id.get())
    .bind(ids)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("grant_role_features", e))?;
    Ok(())
}

#[async_trait]
impl UserStore for PostgresStore {
    #[instrument(skip(self), fields(operation = "list_users"), err)]
    async fn list(&self, query: ListQuery) -> StoreResult<Listing<UserRecord>> {
        let (limit, offset) = window(&query);
        let sql = format!(
            "{USER_SELECT} WHERE u.deleted_at IS NULL ORDER BY {} LIMIT $1 OFFSET $2",
            query.ordering.sql()
        );
        let rows = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM usr_users WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("count_users", e))?;
        Ok(Listing {
            rows,
            total: total(count),
        })
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn get(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "{USER_SELECT} WHERE u.id = $1 AND u.deleted_at IS NULL"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_user", e))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "{USER_SELECT} WHERE u.email = $1 AND u.deleted_at IS NULL"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_email", e))
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "{USER_SELECT} WHERE u.username = $1 AND u.deleted_at IS NULL"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_username", e))
    }

    #[instrument(skip(self), err)]
    async fn find_by_login(&self, username_or_email: &str) -> StoreResult<Option<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "{USER_SELECT} WHERE (u.username = $1 OR u.email = $1) AND u.deleted_at IS NULL \
             ORDER BY u.id LIMIT 1"
        ))
        .bind(username_or_email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_login", e))
    }

    async fn count_by_role(&self, role_id: RoleId) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM usr_users WHERE role_id = $1 AND deleted_at IS NULL",
        )
        .bind(role_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_users_by_role", e))?;
        Ok(total(count))
    }

    #[instrument(skip(self, input), fields(username = %input.username), err)]
    async fn create(&self, input: NewUser) -> StoreResult<UserRecord> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO usr_users (username, name, email, password_hash, role_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&input.username)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.password_hash)
        .bind(input.role_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_user", e))?;

        UserStore::get(self, UserId::new(id))
            .await?
            .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self, changes), fields(user_id = %id), err)]
    async fn update(&self, id: UserId, changes: UserChanges) -> StoreResult<UserRecord> {
        let updated = sqlx::query(
            "UPDATE usr_users SET username = $2, name = $3, email = $4, role_id = $5, \
             updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.get())
        .bind(&changes.username)
        .bind(&changes.name)
        .bind(&changes.email)
        .bind(changes.role_id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_user", e))?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        UserStore::get(self, id).await?.ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self, password_hash), fields(user_id = %id), err)]
    async fn set_password(&self, id: UserId, password_hash: String) -> StoreResult<()> {
        let updated = sqlx::query(
            "UPDATE usr_users SET password_hash = $2, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.get())
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_user_password", e))?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn delete(&self, id: UserId) -> StoreResult<()> {
        soft_delete(&self.pool, "usr_users", id.get()).await
    }
}

/// `table` is always one of the fixed table names above.
pub(super) async fn soft_delete(pool: &PgPool, table: &str, id: i64) -> StoreResult<()> {
    let sql = format!(
        "UPDATE {table} SET deleted_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND deleted_at IS NULL"
    );
    let result = sqlx::query(&sql)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("soft_delete", e))?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}
