use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;
use validator::Validate;

use crate::{
    backend::{to_row, Collection, Filter, Query, RowStore},
    domain::{sort_problems, NewProblem, Problem, ProblemUpdate, ProblemView},
    error::{AppError, Result},
    repository::{decode, decode_all, ProblemRepository},
};

pub struct StoreProblemRepository {
    rows: Arc<dyn RowStore>,
}

impl StoreProblemRepository {
    pub fn new(rows: Arc<dyn RowStore>) -> Self {
        Self { rows }
    }

    fn collection(view: ProblemView) -> Collection {
        match view {
            ProblemView::Full => Collection::Problems,
            ProblemView::Masked => Collection::ProblemsMasked,
        }
    }
}

#[async_trait]
impl ProblemRepository for StoreProblemRepository {
    async fn list(&self, round_number: Option<i32>, view: ProblemView) -> Result<Vec<Problem>> {
        let mut query = Query::new();
        if let Some(number) = round_number {
            query = query.eq("round_number", number);
        }
        query = query.order_by("round_number", true).order_by("sort_order", true);

        let rows = self.rows.select(Self::collection(view), &query).await?;
        let mut problems: Vec<Problem> = decode_all(rows, "problem");
        if round_number.is_some() {
            sort_problems(&mut problems);
        }
        Ok(problems)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Problem>> {
        let rows = self
            .rows
            .select(Collection::Problems, &Query::new().eq("id", id.to_string()).limit(1))
            .await?;
        rows.into_iter().next().map(decode).transpose()
    }

    async fn create(&self, problem: NewProblem) -> Result<Problem> {
        problem.validate()?;

        let row = self.rows.insert(Collection::Problems, to_row(&problem)?).await?;
        let created: Problem = decode(row)?;
        tracing::info!("Problem {} created in round {}", created.code, created.round_number);
        Ok(created)
    }

    async fn update(&self, id: Uuid, update: ProblemUpdate) -> Result<Problem> {
        update.validate()?;

        let patch = to_row(&update)?;
        if patch.is_empty() {
            return self
                .find_by_id(id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Problem {}", id)));
        }

        let updated = self
            .rows
            .update(Collection::Problems, &[Filter::eq("id", id.to_string())], patch)
            .await?;

        match updated.into_iter().next() {
            Some(row) => decode(row),
            None => Err(AppError::NotFound(format!("Problem {}", id))),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let removed = self
            .rows
            .delete(Collection::Problems, &[Filter::eq("id", id.to_string())])
            .await?;

        if removed == 0 {
            return Err(AppError::NotFound(format!("Problem {}", id)));
        }
        Ok(())
    }
}
