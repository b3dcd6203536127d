use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::{
    backend::{Collection, Filter, Query, Row, RowStore},
    domain::{AdminAccount, ADMIN_ACCOUNT_KEY},
    error::{AppError, Result},
    repository::{decode, AdminAccountRepository},
};

pub struct StoreAdminAccountRepository {
    rows: Arc<dyn RowStore>,
}

impl StoreAdminAccountRepository {
    pub fn new(rows: Arc<dyn RowStore>) -> Self {
        Self { rows }
    }

    fn key_filter() -> [Filter; 1] {
        [Filter::eq("setting_key", ADMIN_ACCOUNT_KEY)]
    }

    async fn write(&self, patch: Value) -> Result<()> {
        let patch = match patch {
            Value::Object(map) => map,
            _ => return Err(AppError::Internal("admin patch must be an object".to_string())),
        };

        let updated = self
            .rows
            .update(Collection::AdminSettings, &Self::key_filter(), patch)
            .await?;

        if updated.is_empty() {
            return Err(AppError::NotFound("admin account".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AdminAccountRepository for StoreAdminAccountRepository {
    async fn find_account(&self) -> Result<Option<AdminAccount>> {
        let rows = self
            .rows
            .select(
                Collection::AdminSettings,
                &Query::new().eq("setting_key", ADMIN_ACCOUNT_KEY).limit(1),
            )
            .await?;
        rows.into_iter().next().map(decode).transpose()
    }

    async fn record_failure(&self, failed_attempts: u32, locked_until: Option<DateTime<Utc>>) -> Result<()> {
        self.write(json!({ "failed_attempts": failed_attempts, "locked_until": locked_until }))
            .await
    }

    async fn reset_failures(&self) -> Result<()> {
        self.write(json!({ "failed_attempts": 0, "locked_until": null })).await
    }

    async fn set_password_hash(&self, password_hash: &str) -> Result<()> {
        let patch = json!({
            "password_hash": password_hash,
            "failed_attempts": 0,
            "locked_until": null
        });

        match self.write(patch).await {
            Err(AppError::NotFound(_)) => {
                let mut row = Row::new();
                row.insert("setting_key".to_string(), json!(ADMIN_ACCOUNT_KEY));
                row.insert("password_hash".to_string(), json!(password_hash));
                row.insert("failed_attempts".to_string(), json!(0));
                row.insert("locked_until".to_string(), Value::Null);
                self.rows.insert(Collection::AdminSettings, row).await?;
                tracing::info!("Admin account created");
                Ok(())
            }
            other => other,
        }
    }
}
