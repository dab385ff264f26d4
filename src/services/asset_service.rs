//! Asset records and the mint-status state machine

use chrono::Utc;
use sqlx::types::Json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::hash::calculate_hash;
use crate::models::{
    Asset, CreateAssetRequest, ListAssetsQuery, MintStatus, UpdateMintStatusRequest, Upsert,
};

#[derive(Clone)]
pub struct AssetService {
    db_pool: SqlitePool,
}

impl AssetService {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    /// Create an asset, or retry a PENDING mint owned by the same creator.
    ///
    /// A retry recomputes the hash from the new fields and clears any
    /// previous txHash; it comes back as `Upsert::Existing`.
    pub async fn create_asset(
        &self,
        request: CreateAssetRequest,
        creator: &str,
    ) -> AppResult<Upsert<Asset>> {
        request.validate()?;
        let creator = creator.to_lowercase();
        let data_hash = calculate_hash(&request.hash_input())?;

        let images = request.images.clone().unwrap_or_default();

        match self.get_asset(request.asset_id).await? {
            None => {
                self.ensure_hash_free(&data_hash, request.asset_id).await?;

                let asset = sqlx::query_as::<_, Asset>(
                    r#"
                    INSERT INTO assets (
                        asset_id, data_hash, manufacturer, model, serial_number,
                        manufactured_date, description, images, metadata,
                        mint_status, created_by, created_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    RETURNING *
                    "#,
                )
                .bind(request.asset_id)
                .bind(&data_hash)
                .bind(&request.manufacturer)
                .bind(&request.model)
                .bind(&request.serial_number)
                .bind(&request.manufactured_date)
                .bind(&request.description)
                .bind(Json(&images))
                .bind(request.metadata.as_ref().map(Json))
                .bind(MintStatus::Pending)
                .bind(&creator)
                .bind(Utc::now())
                .fetch_one(&self.db_pool)
                .await
                .map_err(|e| AppError::from_insert(e, "Asset already exists"))?;

                tracing::debug!(asset_id = asset.asset_id, data_hash = %asset.data_hash, "asset created");
                Ok(Upsert::Created(asset))
            }
            Some(existing) => match existing.mint_status {
                MintStatus::Minted => Err(AppError::conflict("Asset already minted")),
                MintStatus::Failed => Err(AppError::conflict("Asset mint already failed")),
                MintStatus::Pending if existing.created_by != creator => {
                    tracing::warn!(asset_id = existing.asset_id, "mint retry by non-creator rejected");
                    Err(AppError::forbidden(
                        "Another party's mint is in flight for this asset",
                    ))
                }
                MintStatus::Pending => {
                    self.ensure_hash_free(&data_hash, request.asset_id).await?;

                    let asset = sqlx::query_as::<_, Asset>(
                        r#"
                        UPDATE assets
                        SET data_hash = ?, manufacturer = ?, model = ?, serial_number = ?,
                            manufactured_date = ?, description = ?, images = ?, metadata = ?,
                            tx_hash = NULL
                        WHERE asset_id = ? AND mint_status = 'PENDING'
                        RETURNING *
                        "#,
                    )
                    .bind(&data_hash)
                    .bind(&request.manufacturer)
                    .bind(&request.model)
                    .bind(&request.serial_number)
                    .bind(&request.manufactured_date)
                    .bind(&request.description)
                    .bind(Json(&images))
                    .bind(request.metadata.as_ref().map(Json))
                    .bind(request.asset_id)
                    .fetch_optional(&self.db_pool)
                    .await
                    .map_err(|e| AppError::from_insert(e, "Asset with identical data already exists"))?
                    .ok_or_else(|| AppError::conflict("Asset mint status changed concurrently"))?;

                    tracing::debug!(asset_id = asset.asset_id, "pending mint retried");
                    Ok(Upsert::Existing(asset))
                }
            },
        }
    }

    /// Another asset id already owning this hash is a conflict.
    async fn ensure_hash_free(&self, data_hash: &str, asset_id: i64) -> AppResult<()> {
        match self.get_asset_by_hash(data_hash).await? {
            Some(other) if other.asset_id != asset_id => {
                tracing::warn!(asset_id, other_asset_id = other.asset_id, "asset data hash collision");
                Err(AppError::conflict("Asset with identical data already exists"))
            }
            _ => Ok(()),
        }
    }

    /// Move a PENDING asset to MINTED or FAILED. Only the creator may.
    pub async fn update_mint_status(
        &self,
        asset_id: i64,
        caller: &str,
        request: UpdateMintStatusRequest,
    ) -> AppResult<Asset> {
        request.validate()?;

        let asset = self
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| AppError::not_found("Asset not found"))?;

        if asset.created_by != caller.to_lowercase() {
            return Err(AppError::forbidden("Only the asset creator can update mint status"));
        }
        if asset.mint_status != MintStatus::Pending {
            return Err(AppError::conflict("Mint status can only change from PENDING"));
        }

        let updated = match request.status {
            MintStatus::Pending => {
                return Err(AppError::validation("Mint status must be MINTED or FAILED"))
            }
            MintStatus::Minted => {
                let tx_hash = request
                    .tx_hash
                    .as_deref()
                    .ok_or_else(|| AppError::validation("txHash is required when status is MINTED"))?;

                sqlx::query_as::<_, Asset>(
                    r#"
                    UPDATE assets
                    SET mint_status = ?, tx_hash = ?, minted_at = ?
                    WHERE asset_id = ? AND mint_status = 'PENDING'
                    RETURNING *
                    "#,
                )
                .bind(MintStatus::Minted)
                .bind(tx_hash.to_lowercase())
                .bind(Utc::now())
                .bind(asset_id)
                .fetch_optional(&self.db_pool)
                .await?
            }
            MintStatus::Failed => {
                sqlx::query_as::<_, Asset>(
                    r#"
                    UPDATE assets
                    SET mint_status = ?, tx_hash = NULL, minted_at = NULL
                    WHERE asset_id = ? AND mint_status = 'PENDING'
                    RETURNING *
                    "#,
                )
                .bind(MintStatus::Failed)
                .bind(asset_id)
                .fetch_optional(&self.db_pool)
                .await?
            }
        };

        let updated =
            updated.ok_or_else(|| AppError::conflict("Mint status can only change from PENDING"))?;
        tracing::debug!(asset_id, status = ?updated.mint_status, "mint status updated");
        Ok(updated)
    }

    pub async fn get_asset(&self, asset_id: i64) -> AppResult<Option<Asset>> {
        let asset = sqlx::query_as::<_, Asset>("SELECT * FROM assets WHERE asset_id = ?")
            .bind(asset_id)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(asset)
    }

    pub async fn get_asset_by_hash(&self, data_hash: &str) -> AppResult<Option<Asset>> {
        let asset = sqlx::query_as::<_, Asset>("SELECT * FROM assets WHERE data_hash = ?")
            .bind(data_hash.to_lowercase())
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(asset)
    }

    /// List assets, newest first
    pub async fn list_assets(&self, query: ListAssetsQuery) -> AppResult<Vec<Asset>> {
        let (limit, offset) = query.pagination().limit_offset();

        let mut query_builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM assets WHERE 1=1");

        if let Some(created_by) = &query.created_by {
            query_builder.push(" AND created_by = ");
            query_builder.push_bind(created_by.to_lowercase());
        }
        if let Some(status) = query.status {
            query_builder.push(" AND mint_status = ");
            query_builder.push_bind(status);
        }

        query_builder.push(" ORDER BY id DESC LIMIT ");
        query_builder.push_bind(limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset);

        let assets = query_builder
            .build_query_as::<Asset>()
            .fetch_all(&self.db_pool)
            .await?;
        Ok(assets)
    }
}
