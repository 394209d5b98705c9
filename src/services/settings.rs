// src/services/settings.rs
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Admin-set price override, in whole currency units
pub const PRICE_KEY: &str = "base_amount";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Setting not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Invalid value for setting {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone)]
struct CachedSetting {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SettingsService {
    db_pool: SqlitePool,
    cache: Arc<RwLock<HashMap<String, CachedSetting>>>,
    cache_ttl: Duration,
}

impl SettingsService {
    /// Create a new SettingsService instance
    pub fn new(db_pool: SqlitePool) -> Self {
        Self {
            db_pool,
            cache: Arc::new(RwLock::new(HashMap::new())),
            cache_ttl: Duration::minutes(5),
        }
    }

    /// Get a setting value by key
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, SettingsError> {
        // Check cache first
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(key) {
                if cached.expires_at > Utc::now() {
                    debug!(key = %key, "Setting retrieved from cache");
                    return Ok(Some(cached.value.clone()));
                }
            }
        }

        let result = sqlx::query_as::<_, (String,)>("SELECT value FROM system_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db_pool)
            .await?;

        match result {
            Some((value,)) => {
                {
                    let mut cache = self.cache.write().await;
                    cache.insert(
                        key.to_string(),
                        CachedSetting {
                            value: value.clone(),
                            expires_at: Utc::now() + self.cache_ttl,
                        },
                    );
                }

                debug!(key = %key, "Setting retrieved from database");
                Ok(Some(value))
            }
            None => {
                debug!(key = %key, "Setting not found");
                Ok(None)
            }
        }
    }

    /// Set a setting value
    pub async fn set_setting(
        &self,
        key: &str,
        value: &str,
        updated_by: Option<&str>,
    ) -> Result<(), SettingsError> {
        sqlx::query(
            r#"
            INSERT INTO system_settings (key, value, updated_at, updated_by)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at,
                updated_by = excluded.updated_by
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().timestamp())
        .bind(updated_by)
        .execute(&self.db_pool)
        .await?;

        self.invalidate_cache_key(key).await;

        info!(key = %key, updated_by = ?updated_by, "Setting updated successfully");
        Ok(())
    }

    /// Invalidate a specific cache entry
    pub async fn invalidate_cache_key(&self, key: &str) {
        let mut cache = self.cache.write().await;
        cache.remove(key);
        debug!(key = %key, "Cache entry invalidated");
    }

    /// Delete a setting
    pub async fn delete_setting(&self, key: &str) -> Result<(), SettingsError> {
        let result = sqlx::query("DELETE FROM system_settings WHERE key = ?")
            .bind(key)
            .execute(&self.db_pool)
            .await?;

        self.invalidate_cache_key(key).await;

        if result.rows_affected() == 0 {
            return Err(SettingsError::NotFound(key.to_string()));
        }

        info!(key = %key, "Setting deleted");
        Ok(())
    }

    // ============================================================================
    // Price
    // ============================================================================

    /// Current price: the stored override, else `default`
    pub async fn current_price(&self, default: i64) -> Result<i64, SettingsError> {
        match self.get_setting(PRICE_KEY).await? {
            Some(value) => value
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|amount| *amount > 0)
                .ok_or(SettingsError::InvalidValue {
                    key: PRICE_KEY.to_string(),
                    value,
                }),
            None => Ok(default),
        }
    }

    pub async fn set_price(&self, amount: i64, updated_by: &str) -> Result<(), SettingsError> {
        if amount <= 0 {
            return Err(SettingsError::InvalidValue {
                key: PRICE_KEY.to_string(),
                value: amount.to_string(),
            });
        }

        self.set_setting(PRICE_KEY, &amount.to_string(), Some(updated_by))
            .await
    }

    /// Drops the override so the configured base amount applies again.
    /// Returns whether an override existed.
    pub async fn reset_price(&self) -> Result<bool, SettingsError> {
        match self.delete_setting(PRICE_KEY).await {
            Ok(()) => Ok(true),
            Err(SettingsError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
