use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;
use validator::Validate;

use crate::{
    backend::{to_row, Collection, Filter, Query, RowStore},
    domain::{Hint, HintUpdate, NewHint},
    error::{AppError, Result},
    repository::{decode, decode_all, HintRepository},
};

pub struct StoreHintRepository {
    rows: Arc<dyn RowStore>,
}

impl StoreHintRepository {
    pub fn new(rows: Arc<dyn RowStore>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl HintRepository for StoreHintRepository {
    async fn list(&self, problem_id: Option<Uuid>) -> Result<Vec<Hint>> {
        let mut query = Query::new();
        if let Some(id) = problem_id {
            query = query.eq("problem_id", id.to_string());
        }
        query = query.order_by("sort_order", true);

        let rows = self.rows.select(Collection::Hints, &query).await?;
        Ok(decode_all(rows, "hint"))
    }

    async fn create(&self, hint: NewHint) -> Result<Hint> {
        hint.validate()?;

        let row = self.rows.insert(Collection::Hints, to_row(&hint)?).await?;
        decode(row)
    }

    async fn update(&self, id: Uuid, update: HintUpdate) -> Result<Hint> {
        update.validate()?;

        let updated = self
            .rows
            .update(Collection::Hints, &[Filter::eq("id", id.to_string())], to_row(&update)?)
            .await?;

        match updated.into_iter().next() {
            Some(row) => decode(row),
            None => Err(AppError::NotFound(format!("Hint {}", id))),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let removed = self
            .rows
            .delete(Collection::Hints, &[Filter::eq("id", id.to_string())])
            .await?;

        if removed == 0 {
            return Err(AppError::NotFound(format!("Hint {}", id)));
        }
        Ok(())
    }
}
