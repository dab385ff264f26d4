//! Verification requests: the oracle's work queue and its state machine

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::time::Duration;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{
    generate_request_id, CreateVerificationRequest, EvidenceStatus, UpdateVerificationRequest,
    Upsert, VerificationRequest, VerificationStatus,
};

#[derive(Clone)]
pub struct VerificationService {
    db_pool: SqlitePool,
}

impl VerificationService {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    /// Queue a request, or return the PENDING one that already matches
    /// (assetId, requestType, providerId, requestedBy).
    pub async fn create_request(
        &self,
        request: CreateVerificationRequest,
        requested_by: &str,
    ) -> AppResult<Upsert<VerificationRequest>> {
        request.validate()?;
        let requested_by = requested_by.to_lowercase();

        let asset_exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM assets WHERE asset_id = ?")
                .bind(request.asset_id)
                .fetch_optional(&self.db_pool)
                .await?;
        if asset_exists.is_none() {
            return Err(AppError::not_found("Asset not found"));
        }

        if let Some(existing) = self.find_pending(&request, &requested_by).await? {
            tracing::debug!(request_id = %existing.request_id, "verification request already pending");
            return Ok(Upsert::Existing(existing));
        }

        let inserted = sqlx::query_as::<_, VerificationRequest>(
            r#"
            INSERT INTO verification_requests (
                request_id, asset_id, request_type, provider_id, requested_by, status, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(generate_request_id())
        .bind(request.asset_id)
        .bind(request.request_type)
        .bind(&request.provider_id)
        .bind(&requested_by)
        .bind(VerificationStatus::Pending)
        .bind(Utc::now())
        .fetch_one(&self.db_pool)
        .await;

        let created = match inserted {
            Ok(created) => created,
            // a concurrent create won the pending-tuple index
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                if let Some(existing) = self.find_pending(&request, &requested_by).await? {
                    tracing::debug!(request_id = %existing.request_id, "verification request created concurrently");
                    return Ok(Upsert::Existing(existing));
                }
                return Err(AppError::conflict("Verification request already exists"));
            }
            Err(e) => return Err(AppError::Database(e)),
        };

        tracing::debug!(request_id = %created.request_id, asset_id = created.asset_id, "verification request created");
        Ok(Upsert::Created(created))
    }

    async fn find_pending(
        &self,
        request: &CreateVerificationRequest,
        requested_by: &str,
    ) -> AppResult<Option<VerificationRequest>> {
        // `IS` compares NULL provider ids as equal
        let existing = sqlx::query_as::<_, VerificationRequest>(
            r#"
            SELECT * FROM verification_requests
            WHERE asset_id = ? AND request_type = ? AND provider_id IS ?
              AND requested_by = ? AND status = 'PENDING'
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(request.asset_id)
        .bind(request.request_type)
        .bind(&request.provider_id)
        .bind(requested_by)
        .fetch_optional(&self.db_pool)
        .await?;
        Ok(existing)
    }

    /// Apply a forward status transition plus any supplied result fields.
    ///
    /// The write is conditional on the status read here, so of two callers
    /// racing to claim a PENDING request exactly one wins and the other
    /// gets a conflict. Completing with an evidence id and tx hash also
    /// confirms that evidence in the same transaction.
    pub async fn update_request(
        &self,
        request_id: &str,
        update: UpdateVerificationRequest,
    ) -> AppResult<VerificationRequest> {
        update.validate()?;

        let current = self
            .get_request(request_id)
            .await?
            .ok_or_else(|| AppError::not_found("Verification request not found"))?;

        if let Some(evidence_id) = update.evidence_id {
            let evidence_exists: Option<i64> =
                sqlx::query_scalar("SELECT id FROM evidence WHERE id = ?")
                    .bind(evidence_id)
                    .fetch_optional(&self.db_pool)
                    .await?;
            if evidence_exists.is_none() {
                return Err(AppError::not_found("Evidence not found"));
            }
        }

        if !current.status.can_transition_to(update.status) {
            tracing::warn!(
                request_id,
                from = %current.status,
                to = %update.status,
                "rejected verification status transition"
            );
            return Err(AppError::conflict(format!(
                "Cannot move verification request from {} to {}",
                current.status, update.status
            )));
        }

        let now = Utc::now();
        let claimed_at = (update.status == VerificationStatus::Processing).then_some(now);
        let processed_at = update.status.is_terminal().then_some(now);
        let tx_hash = update.tx_hash.as_ref().map(|h| h.to_lowercase());
        let data_hash = update.data_hash.as_ref().map(|h| h.to_lowercase());

        let mut tx = self.db_pool.begin().await?;

        let updated = sqlx::query_as::<_, VerificationRequest>(
            r#"
            UPDATE verification_requests
            SET status = ?,
                claimed_at = COALESCE(?, claimed_at),
                processed_at = COALESCE(?, processed_at),
                blockchain_event_id = COALESCE(?, blockchain_event_id),
                tx_hash = COALESCE(?, tx_hash),
                data_hash = COALESCE(?, data_hash),
                evidence_id = COALESCE(?, evidence_id),
                error_message = COALESCE(?, error_message)
            WHERE request_id = ? AND status = ?
            RETURNING *
            "#,
        )
        .bind(update.status)
        .bind(claimed_at)
        .bind(processed_at)
        .bind(update.blockchain_event_id)
        .bind(&tx_hash)
        .bind(&data_hash)
        .bind(update.evidence_id)
        .bind(&update.error_message)
        .bind(request_id)
        .bind(current.status)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            AppError::conflict("Verification request status changed concurrently")
        })?;

        if updated.status == VerificationStatus::Completed {
            if let (Some(evidence_id), Some(tx_hash)) = (updated.evidence_id, &updated.tx_hash) {
                let confirmed = sqlx::query(
                    r#"
                    UPDATE evidence
                    SET status = ?, is_verified = 1, blockchain_event_id = ?, tx_hash = ?,
                        confirmed_at = ?, verified_at = ?
                    WHERE id = ? AND status = 'PENDING'
                    "#,
                )
                .bind(EvidenceStatus::Confirmed)
                .bind(updated.blockchain_event_id)
                .bind(tx_hash)
                .bind(now)
                .bind(now)
                .bind(evidence_id)
                .execute(&mut *tx)
                .await?;

                tracing::debug!(
                    request_id,
                    evidence_id,
                    confirmed = confirmed.rows_affected(),
                    "reconciled evidence with completed request"
                );
            }
        }

        tx.commit().await?;

        tracing::debug!(request_id, status = %updated.status, "verification request updated");
        Ok(updated)
    }

    /// Fail PROCESSING requests claimed longer than `older_than` ago.
    ///
    /// They are never put back to PENDING: the ledger transaction may have
    /// been sent before the worker went away.
    pub async fn fail_stale_requests(&self, older_than: Duration) -> AppResult<u64> {
        let threshold = chrono::Duration::from_std(older_than)
            .map_err(|e| AppError::Internal(format!("invalid stale threshold: {e}")))?;
        let cutoff: DateTime<Utc> = Utc::now() - threshold;

        let processing = sqlx::query_as::<_, VerificationRequest>(
            "SELECT * FROM verification_requests WHERE status = 'PROCESSING' ORDER BY id",
        )
        .fetch_all(&self.db_pool)
        .await?;

        let message = format!("Processing timed out after {}s", older_than.as_secs());
        let mut failed = 0;

        for request in processing {
            let claimed_at = request.claimed_at.unwrap_or(request.created_at);
            if claimed_at >= cutoff {
                continue;
            }

            let result = sqlx::query(
                r#"
                UPDATE verification_requests
                SET status = ?, error_message = ?, processed_at = ?
                WHERE request_id = ? AND status = 'PROCESSING'
                "#,
            )
            .bind(VerificationStatus::Failed)
            .bind(&message)
            .bind(Utc::now())
            .bind(&request.request_id)
            .execute(&self.db_pool)
            .await?;

            if result.rows_affected() > 0 {
                tracing::warn!(request_id = %request.request_id, %claimed_at, "stale verification request failed");
                failed += 1;
            }
        }

        Ok(failed)
    }

    /// PENDING requests in creation order
    pub async fn list_pending(&self) -> AppResult<Vec<VerificationRequest>> {
        let requests = sqlx::query_as::<_, VerificationRequest>(
            "SELECT * FROM verification_requests WHERE status = 'PENDING' ORDER BY id",
        )
        .fetch_all(&self.db_pool)
        .await?;
        Ok(requests)
    }

    pub async fn get_request(&self, request_id: &str) -> AppResult<Option<VerificationRequest>> {
        let request = sqlx::query_as::<_, VerificationRequest>(
            "SELECT * FROM verification_requests WHERE request_id = ?",
        )
        .bind(request_id)
        .fetch_optional(&self.db_pool)
        .await?;
        Ok(request)
    }

    pub async fn list_by_asset(&self, asset_id: i64) -> AppResult<Vec<VerificationRequest>> {
        let requests = sqlx::query_as::<_, VerificationRequest>(
            "SELECT * FROM verification_requests WHERE asset_id = ? ORDER BY id",
        )
        .bind(asset_id)
        .fetch_all(&self.db_pool)
        .await?;
        Ok(requests)
    }
}
