//! Vehicle types, vehicles and loans.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use tracing::instrument;

use eproc_core::{ListQuery, LoanId, VehicleId, VehicleTypeId};

use super::access::soft_delete;
use super::*;
use crate::store::{LoanStore, StoreResult, VehicleStore, VehicleTypeStore};

#[async_trait]
impl VehicleTypeStore for PostgresStore {
    #[instrument(skip(self), fields(operation = "list_vehicle_types"), err)]
    async fn list(&self, query: ListQuery) -> StoreResult<Listing<VehicleTypeRecord>> {
        let (limit, offset) = window(&query);
        let sql = format!(
            "SELECT {VEHICLE_TYPE_COLUMNS} FROM vehicle_types WHERE deleted_at IS NULL \
             ORDER BY {} LIMIT $1 OFFSET $2",
            query.ordering.sql()
        );
        let rows = sqlx::query_as::<_, VehicleTypeRecord>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_vehicle_types", e))?;
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM vehicle_types WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("count_vehicle_types", e))?;
        Ok(Listing {
            rows,
            total: total(count),
        })
    }

    async fn get(&self, id: VehicleTypeId) -> StoreResult<Option<VehicleTypeRecord>> {
        sqlx::query_as::<_, VehicleTypeRecord>(&format!(
            "SELECT {VEHICLE_TYPE_COLUMNS} FROM vehicle_types WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_vehicle_type", e))
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<VehicleTypeRecord>> {
        sqlx::query_as::<_, VehicleTypeRecord>(&format!(
            "SELECT {VEHICLE_TYPE_COLUMNS} FROM vehicle_types WHERE name = $1 AND deleted_at IS NULL"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_vehicle_type_by_name", e))
    }

    #[instrument(skip(self), err)]
    async fn create(&self, name: String) -> StoreResult<VehicleTypeRecord> {
        sqlx::query_as::<_, VehicleTypeRecord>(&format!(
            "INSERT INTO vehicle_types (name) VALUES ($1) RETURNING {VEHICLE_TYPE_COLUMNS}"
        ))
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_vehicle_type", e))
    }

    #[instrument(skip(self), fields(vehicle_type_id = %id), err)]
    async fn update(&self, id: VehicleTypeId, name: String) -> StoreResult<VehicleTypeRecord> {
        sqlx::query_as::<_, VehicleTypeRecord>(&format!(
            "UPDATE vehicle_types SET name = $2, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {VEHICLE_TYPE_COLUMNS}"
        ))
        .bind(id.get())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_vehicle_type", e))?
        .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self), fields(vehicle_type_id = %id), err)]
    async fn delete(&self, id: VehicleTypeId) -> StoreResult<()> {
        soft_delete(&self.pool, "vehicle_types", id.get()).await
    }
}

#[async_trait]
impl VehicleStore for PostgresStore {
    #[instrument(skip(self), fields(operation = "list_vehicles"), err)]
    async fn list(
        &self,
        filter: VehicleFilter,
        query: ListQuery,
    ) -> StoreResult<Listing<VehicleRecord>> {
        let (limit, offset) = window(&query);
        let type_id = filter.type_id.map(VehicleTypeId::get);
        let predicate = "v.deleted_at IS NULL \
             AND ($1::BIGINT IS NULL OR v.type_id = $1) \
             AND ($2::BOOLEAN IS NULL OR v.is_available = $2)";
        let sql = format!(
            "{VEHICLE_SELECT} WHERE {predicate} ORDER BY {} LIMIT $3 OFFSET $4",
            query.ordering.sql()
        );
        let rows = sqlx::query_as::<_, VehicleRecord>(&sql)
            .bind(type_id)
            .bind(filter.is_available)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_vehicles", e))?;
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM vehicles v WHERE {predicate}"))
                .bind(type_id)
                .bind(filter.is_available)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("count_vehicles", e))?;
        Ok(Listing {
            rows,
            total: total(count),
        })
    }

    #[instrument(skip(self), fields(vehicle_id = %id), err)]
    async fn get(&self, id: VehicleId) -> StoreResult<Option<VehicleRecord>> {
        sqlx::query_as::<_, VehicleRecord>(&format!(
            "{VEHICLE_SELECT} WHERE v.id = $1 AND v.deleted_at IS NULL"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_vehicle", e))
    }

    async fn find_by_police_number(
        &self,
        police_number: &str,
    ) -> StoreResult<Option<VehicleRecord>> {
        sqlx::query_as::<_, VehicleRecord>(&format!(
            "{VEHICLE_SELECT} WHERE v.police_number = $1 AND v.deleted_at IS NULL"
        ))
        .bind(police_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_vehicle_by_police_number", e))
    }

    async fn count_by_type(&self, type_id: VehicleTypeId) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM vehicles WHERE type_id = $1 AND deleted_at IS NULL",
        )
        .bind(type_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_vehicles_by_type", e))?;
        Ok(total(count))
    }

    #[instrument(skip(self), fields(police_number = %input.police_number), err)]
    async fn create(&self, input: VehicleInput) -> StoreResult<VehicleRecord> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO vehicles (type_id, name, police_number, is_available) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(input.type_id.get())
        .bind(&input.name)
        .bind(&input.police_number)
        .bind(input.is_available.unwrap_or(true))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_vehicle", e))?;

        VehicleStore::get(self, VehicleId::new(id))
            .await?
            .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self), fields(vehicle_id = %id), err)]
    async fn update(&self, id: VehicleId, input: VehicleInput) -> StoreResult<VehicleRecord> {
        let updated = sqlx::query(
            "UPDATE vehicles SET type_id = $2, name = $3, police_number = $4, \
             is_available = COALESCE($5, is_available), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.get())
        .bind(input.type_id.get())
        .bind(&input.name)
        .bind(&input.police_number)
        .bind(input.is_available)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_vehicle", e))?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        VehicleStore::get(self, id).await?.ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self), fields(vehicle_id = %id), err)]
    async fn delete(&self, id: VehicleId) -> StoreResult<()> {
        soft_delete(&self.pool, "vehicles", id.get()).await
    }
}

/// Conditional take: only an active, available vehicle flips to unavailable.
async fn take_vehicle(tx: &mut Transaction<'_, Postgres>, id: VehicleId) -> StoreResult<()> {
    let taken = sqlx::query(
        "UPDATE vehicles SET is_available = FALSE, updated_at = NOW() \
         WHERE id = $1 AND deleted_at IS NULL AND is_available",
    )
    .bind(id.get())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("take_vehicle", e))?;

    if taken.rows_affected() == 0 {
        return Err(StoreError::VehicleUnavailable(id));
    }
    Ok(())
}

async fn free_vehicle(tx: &mut Transaction<'_, Postgres>, id: VehicleId) -> StoreResult<()> {
    sqlx::query("UPDATE vehicles SET is_available = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(id.get())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("free_vehicle", e))?;
    Ok(())
}

/// Locks the loan row and returns `(vehicle_id, still_open)`.
async fn lock_loan(
    tx: &mut Transaction<'_, Postgres>,
    id: LoanId,
) -> StoreResult<(VehicleId, bool)> {
    let row = sqlx::query(
        "SELECT vehicle_id, returned_at IS NULL AS open FROM loans \
         WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
    )
    .bind(id.get())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_loan", e))?
    .ok_or(StoreError::NotFound)?;

    let vehicle_id: i64 = row
        .try_get("vehicle_id")
        .map_err(|e| map_sqlx_error("lock_loan", e))?;
    let open: bool = row
        .try_get("open")
        .map_err(|e| map_sqlx_error("lock_loan", e))?;
    Ok((VehicleId::new(vehicle_id), open))
}

#[async_trait]
impl LoanStore for PostgresStore {
    #[instrument(skip(self), fields(operation = "list_loans"), err)]
    async fn list(&self, filter: LoanFilter, query: ListQuery) -> StoreResult<Listing<LoanRecord>> {
        let (limit, offset) = window(&query);
        let user_id = filter.user_id.map(|id| id.get());
        let vehicle_id = filter.vehicle_id.map(|id| id.get());
        let predicate = "l.deleted_at IS NULL \
             AND ($1::BIGINT IS NULL OR l.user_id = $1) \
             AND ($2::BIGINT IS NULL OR l.vehicle_id = $2)";
        let sql = format!(
            "{LOAN_SELECT} WHERE {predicate} ORDER BY {} LIMIT $3 OFFSET $4",
            query.ordering.sql()
        );
        let rows = sqlx::query_as::<_, LoanRecord>(&sql)
            .bind(user_id)
            .bind(vehicle_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_loans", e))?;
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM loans l WHERE {predicate}"))
                .bind(user_id)
                .bind(vehicle_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("count_loans", e))?;
        Ok(Listing {
            rows,
            total: total(count),
        })
    }

    #[instrument(skip(self), fields(loan_id = %id), err)]
    async fn get(&self, id: LoanId) -> StoreResult<Option<LoanRecord>> {
        sqlx::query_as::<_, LoanRecord>(&format!(
            "{LOAN_SELECT} WHERE l.id = $1 AND l.deleted_at IS NULL"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_loan", e))
    }

    async fn has_open_loan(&self, vehicle_id: VehicleId) -> StoreResult<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM loans \
             WHERE vehicle_id = $1 AND returned_at IS NULL AND deleted_at IS NULL)",
        )
        .bind(vehicle_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("vehicle_has_open_loan", e))
    }

    #[instrument(
        skip(self),
        fields(user_id = %input.user_id, vehicle_id = %input.vehicle_id),
        err
    )]
    async fn create(&self, input: LoanInput) -> StoreResult<LoanRecord> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_create_loan", e))?;

        take_vehicle(&mut tx, input.vehicle_id).await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO loans (user_id, vehicle_id, purpose, return_time) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(input.user_id.get())
        .bind(input.vehicle_id.get())
        .bind(&input.purpose)
        .bind(input.return_time)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_loan", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_create_loan", e))?;

        LoanStore::get(self, LoanId::new(id))
            .await?
            .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self), fields(loan_id = %id, vehicle_id = %input.vehicle_id), err)]
    async fn update(&self, id: LoanId, input: LoanInput) -> StoreResult<LoanRecord> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_update_loan", e))?;

        let (current_vehicle, open) = lock_loan(&mut tx, id).await?;
        if open && current_vehicle != input.vehicle_id {
            take_vehicle(&mut tx, input.vehicle_id).await?;
            free_vehicle(&mut tx, current_vehicle).await?;
        }

        sqlx::query(
            "UPDATE loans SET user_id = $2, vehicle_id = $3, purpose = $4, return_time = $5, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id.get())
        .bind(input.user_id.get())
        .bind(input.vehicle_id.get())
        .bind(&input.purpose)
        .bind(input.return_time)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_loan", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_update_loan", e))?;

        LoanStore::get(self, id).await?.ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self), fields(loan_id = %id), err)]
    async fn delete(&self, id: LoanId) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_delete_loan", e))?;

        let (vehicle_id, open) = lock_loan(&mut tx, id).await?;
        sqlx::query("UPDATE loans SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_loan", e))?;
        if open {
            free_vehicle(&mut tx, vehicle_id).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_delete_loan", e))
    }

    #[instrument(skip(self), fields(loan_id = %id), err)]
    async fn mark_returned(&self, id: LoanId, at: DateTime<Utc>) -> StoreResult<LoanRecord> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_return_loan", e))?;

        let (vehicle_id, open) = lock_loan(&mut tx, id).await?;
        if !open {
            return Err(StoreError::AlreadyReturned(id));
        }
        sqlx::query("UPDATE loans SET returned_at = $2, updated_at = $2 WHERE id = $1")
            .bind(id.get())
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("return_loan", e))?;
        free_vehicle(&mut tx, vehicle_id).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_return_loan", e))?;

        LoanStore::get(self, id).await?.ok_or(StoreError::NotFound)
    }
}
