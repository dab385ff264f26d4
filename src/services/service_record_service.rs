use chrono::Utc;
use sqlx::types::Json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{CreateServiceRecordRequest, ServiceRecord};

/// Provider service records the oracle reads
#[derive(Clone)]
pub struct ServiceRecordService {
    db_pool: SqlitePool,
}

impl ServiceRecordService {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    pub async fn create_record(&self, request: CreateServiceRecordRequest) -> AppResult<ServiceRecord> {
        request.validate()?;
        self.ensure_asset(request.asset_id).await?;

        let work_performed = request.work_performed.clone().unwrap_or_default();
        let record = sqlx::query_as::<_, ServiceRecord>(
            r#"
            INSERT INTO service_records (
                record_id, asset_id, provider_id, service_type, service_date,
                technician, work_performed, notes, verified, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&request.record_id)
        .bind(request.asset_id)
        .bind(&request.provider_id)
        .bind(request.service_type)
        .bind(&request.service_date)
        .bind(&request.technician)
        .bind(Json(&work_performed))
        .bind(&request.notes)
        .bind(request.verified.unwrap_or(true))
        .bind(Utc::now())
        .fetch_one(&self.db_pool)
        .await
        .map_err(|e| AppError::from_insert(e, "Service record already exists"))?;

        tracing::debug!(record_id = %record.record_id, asset_id = record.asset_id, "service record stored");
        Ok(record)
    }

    /// All records for an asset, oldest first. Unknown assets are NotFound.
    pub async fn list_by_asset(&self, asset_id: i64) -> AppResult<Vec<ServiceRecord>> {
        self.ensure_asset(asset_id).await?;

        let records = sqlx::query_as::<_, ServiceRecord>(
            "SELECT * FROM service_records WHERE asset_id = ? ORDER BY id",
        )
        .bind(asset_id)
        .fetch_all(&self.db_pool)
        .await?;
        Ok(records)
    }

    async fn ensure_asset(&self, asset_id: i64) -> AppResult<()> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM assets WHERE asset_id = ?")
            .bind(asset_id)
            .fetch_optional(&self.db_pool)
            .await?;
        exists
            .map(|_| ())
            .ok_or_else(|| AppError::not_found("Asset not found"))
    }
}
