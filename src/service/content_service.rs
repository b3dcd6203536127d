use std::sync::Arc;

use uuid::Uuid;

use crate::{
    auth::AdminAuthGuard,
    domain::{Hint, HintUpdate, NewHint, NewProblem, Problem, ProblemUpdate, ProblemView},
    error::{AppError, Result},
    repository::{HintRepository, ProblemRepository},
};

/// Admin editing of problems and hints.
pub struct ContentService {
    admin: Arc<AdminAuthGuard>,
    problems: Arc<dyn ProblemRepository>,
    hints: Arc<dyn HintRepository>,
}

impl ContentService {
    pub fn new(
        admin: Arc<AdminAuthGuard>,
        problems: Arc<dyn ProblemRepository>,
        hints: Arc<dyn HintRepository>,
    ) -> Self {
        Self {
            admin,
            problems,
            hints,
        }
    }

    fn authorize(&self) -> Result<()> {
        if !self.admin.verify() {
            return Err(AppError::Unauthorized);
        }
        self.admin.touch_activity();
        Ok(())
    }

    pub async fn list_problems(&self, round_number: Option<i32>) -> Result<Vec<Problem>> {
        self.authorize()?;
        self.problems.list(round_number, ProblemView::Full).await
    }

    pub async fn create_problem(&self, problem: NewProblem) -> Result<Problem> {
        self.authorize()?;
        self.problems.create(problem).await
    }

    pub async fn update_problem(&self, id: Uuid, update: ProblemUpdate) -> Result<Problem> {
        self.authorize()?;
        self.problems.update(id, update).await
    }

    pub async fn delete_problem(&self, id: Uuid) -> Result<()> {
        self.authorize()?;
        self.problems.delete(id).await?;
        tracing::info!("Problem {} deleted", id);
        Ok(())
    }

    pub async fn create_hint(&self, hint: NewHint) -> Result<Hint> {
        self.authorize()?;
        if self.problems.find_by_id(hint.problem_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Problem {}", hint.problem_id)));
        }
        self.hints.create(hint).await
    }

    pub async fn update_hint(&self, id: Uuid, update: HintUpdate) -> Result<Hint> {
        self.authorize()?;
        self.hints.update(id, update).await
    }

    pub async fn delete_hint(&self, id: Uuid) -> Result<()> {
        self.authorize()?;
        self.hints.delete(id).await
    }
}
