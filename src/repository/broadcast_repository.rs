use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    backend::{to_row, Collection, Filter, Query, Row, RowStore},
    domain::{Broadcast, NewBroadcast},
    error::{AppError, Result},
    repository::{decode, decode_all, BroadcastRepository},
};

pub struct StoreBroadcastRepository {
    rows: Arc<dyn RowStore>,
}

impl StoreBroadcastRepository {
    pub fn new(rows: Arc<dyn RowStore>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl BroadcastRepository for StoreBroadcastRepository {
    async fn list_active(&self, limit: usize) -> Result<Vec<Broadcast>> {
        let query = Query::new()
            .eq("is_active", true)
            .order_by("created_at", false)
            .limit(limit);

        let rows = self.rows.select(Collection::Broadcasts, &query).await?;
        Ok(decode_all(rows, "broadcast"))
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Broadcast>> {
        let query = Query::new().order_by("created_at", false).limit(limit);

        let rows = self.rows.select(Collection::Broadcasts, &query).await?;
        Ok(decode_all(rows, "broadcast"))
    }

    async fn create(&self, broadcast: NewBroadcast) -> Result<Broadcast> {
        broadcast.validate()?;

        let mut row = to_row(&broadcast)?;
        row.insert("is_active".to_string(), json!(true));

        let created: Broadcast = decode(self.rows.insert(Collection::Broadcasts, row).await?)?;
        tracing::info!("Broadcast {} sent ({:?})", created.id, created.severity);
        Ok(created)
    }

    async fn deactivate(&self, id: Uuid) -> Result<()> {
        let mut patch = Row::new();
        patch.insert("is_active".to_string(), json!(false));

        let updated = self
            .rows
            .update(Collection::Broadcasts, &[Filter::eq("id", id.to_string())], patch)
            .await?;

        if updated.is_empty() {
            return Err(AppError::NotFound(format!("Broadcast {}", id)));
        }
        Ok(())
    }
}
