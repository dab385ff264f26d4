//! Evidence records and the PENDING -> CONFIRMED transition

use chrono::Utc;
use sqlx::types::Json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::auth::Caller;
use crate::error::{AppError, AppResult};
use crate::hash::calculate_hash;
use crate::models::{
    ConfirmEvidenceRequest, CreateEvidenceRequest, Evidence, EvidenceStatus, Upsert,
};

#[derive(Clone)]
pub struct EvidenceService {
    db_pool: SqlitePool,
}

impl EvidenceService {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    /// Store evidence under the hash of its hashed subset.
    ///
    /// Resubmitting a payload whose evidence is still PENDING returns the
    /// stored row. Evidence submitted by the oracle is attributed to the
    /// address in `metadata.verifiedBy`.
    pub async fn create_evidence(
        &self,
        request: CreateEvidenceRequest,
        caller: &Caller,
    ) -> AppResult<Upsert<Evidence>> {
        request.validate()?;

        let payload = request.payload();
        let (created_by, verified_by) = match caller {
            Caller::Wallet(address) => (address.to_lowercase(), None),
            Caller::Oracle => {
                let oracle = payload
                    .verified_by()
                    .filter(|address| crate::models::is_address(address))
                    .ok_or_else(|| {
                        AppError::validation("metadata.verifiedBy must hold the oracle address")
                    })?
                    .to_lowercase();
                (oracle.clone(), Some(oracle))
            }
        };

        let asset_exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM assets WHERE asset_id = ?")
                .bind(request.asset_id)
                .fetch_optional(&self.db_pool)
                .await?;
        if asset_exists.is_none() {
            return Err(AppError::not_found("Asset not found"));
        }

        let data_hash = calculate_hash(&payload)?;

        if let Some(existing) = self.get_evidence_by_hash(&data_hash).await? {
            return match existing.status {
                EvidenceStatus::Pending => {
                    tracing::debug!(evidence_id = existing.id, "returning pending evidence");
                    Ok(Upsert::Existing(existing))
                }
                EvidenceStatus::Confirmed => {
                    tracing::warn!(evidence_id = existing.id, "evidence already confirmed");
                    Err(AppError::conflict("Evidence already confirmed on-chain"))
                }
            };
        }

        let files = request.files.clone().unwrap_or_default();
        let evidence = sqlx::query_as::<_, Evidence>(
            r#"
            INSERT INTO evidence (
                asset_id, data_hash, event_type, event_date, provider_id, provider_name,
                description, files, metadata, status, is_verified, verified_by,
                created_by, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(request.asset_id)
        .bind(&data_hash)
        .bind(request.event_type)
        .bind(&request.event_date)
        .bind(&request.provider_id)
        .bind(&request.provider_name)
        .bind(&request.description)
        .bind(Json(&files))
        .bind(request.metadata.as_ref().map(Json))
        .bind(EvidenceStatus::Pending)
        .bind(false)
        .bind(&verified_by)
        .bind(&created_by)
        .bind(Utc::now())
        .fetch_one(&self.db_pool)
        .await
        .map_err(|e| AppError::from_insert(e, "Evidence already exists"))?;

        tracing::debug!(evidence_id = evidence.id, asset_id = evidence.asset_id, "evidence created");
        Ok(Upsert::Created(evidence))
    }

    /// Anchor a PENDING row after its on-chain transaction landed.
    pub async fn confirm_evidence(
        &self,
        id: i64,
        request: ConfirmEvidenceRequest,
    ) -> AppResult<Evidence> {
        request.validate()?;

        let evidence = sqlx::query_as::<_, Evidence>(
            r#"
            UPDATE evidence
            SET status = ?, tx_hash = ?, blockchain_event_id = ?, confirmed_at = ?
            WHERE id = ? AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(EvidenceStatus::Confirmed)
        .bind(request.tx_hash.to_lowercase())
        .bind(request.blockchain_event_id)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("Pending evidence not found"))?;

        tracing::debug!(evidence_id = id, tx_hash = %request.tx_hash, "evidence confirmed");
        Ok(evidence)
    }

    pub async fn get_evidence(&self, id: i64) -> AppResult<Option<Evidence>> {
        let evidence = sqlx::query_as::<_, Evidence>("SELECT * FROM evidence WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(evidence)
    }

    pub async fn get_evidence_by_hash(&self, data_hash: &str) -> AppResult<Option<Evidence>> {
        let evidence = sqlx::query_as::<_, Evidence>("SELECT * FROM evidence WHERE data_hash = ?")
            .bind(data_hash.to_lowercase())
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(evidence)
    }

    pub async fn list_by_asset(&self, asset_id: i64) -> AppResult<Vec<Evidence>> {
        let evidence =
            sqlx::query_as::<_, Evidence>("SELECT * FROM evidence WHERE asset_id = ? ORDER BY id")
                .bind(asset_id)
                .fetch_all(&self.db_pool)
                .await?;
        Ok(evidence)
    }
}
