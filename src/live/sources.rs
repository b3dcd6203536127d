use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::CollectionSource;
use crate::{
    backend::Collection,
    domain::{Broadcast, Hint, Problem, ProblemView, Round},
    error::Result,
    repository::{BroadcastRepository, HintRepository, ProblemRepository, RoundRepository},
};

pub struct RoundsSource {
    pub repo: Arc<dyn RoundRepository>,
}

#[async_trait]
impl CollectionSource for RoundsSource {
    type Item = Round;

    fn collection(&self) -> Collection {
        Collection::Rounds
    }

    async fn fetch(&self) -> Result<Vec<Round>> {
        self.repo.list().await
    }
}

pub struct ProblemsSource {
    pub repo: Arc<dyn ProblemRepository>,
    pub round_number: Option<i32>,
    pub view: ProblemView,
}

#[async_trait]
impl CollectionSource for ProblemsSource {
    type Item = Problem;

    fn collection(&self) -> Collection {
        match self.view {
            ProblemView::Full => Collection::Problems,
            ProblemView::Masked => Collection::ProblemsMasked,
        }
    }

    async fn fetch(&self) -> Result<Vec<Problem>> {
        self.repo.list(self.round_number, self.view).await
    }
}

pub struct HintsSource {
    pub repo: Arc<dyn HintRepository>,
    pub problem_id: Option<Uuid>,
}

#[async_trait]
impl CollectionSource for HintsSource {
    type Item = Hint;

    fn collection(&self) -> Collection {
        Collection::Hints
    }

    async fn fetch(&self) -> Result<Vec<Hint>> {
        self.repo.list(self.problem_id).await
    }
}

pub struct BroadcastsSource {
    pub repo: Arc<dyn BroadcastRepository>,
    pub limit: usize,
}

#[async_trait]
impl CollectionSource for BroadcastsSource {
    type Item = Broadcast;

    fn collection(&self) -> Collection {
        Collection::Broadcasts
    }

    async fn fetch(&self) -> Result<Vec<Broadcast>> {
        self.repo.list_active(self.limit).await
    }
}
