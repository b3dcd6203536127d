use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::{
    auth::generate_token,
    backend::{Collection, Query, Row, RowStore},
    domain::Team,
    error::{AppError, Result},
    repository::{decode, TeamRepository},
};

pub struct StoreTeamRepository {
    rows: Arc<dyn RowStore>,
}

impl StoreTeamRepository {
    pub fn new(rows: Arc<dyn RowStore>) -> Self {
        Self { rows }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Team>> {
        let rows = self
            .rows
            .select(Collection::Teams, &Query::new().eq(column, value).limit(1))
            .await?;
        rows.into_iter().next().map(decode).transpose()
    }
}

#[async_trait]
impl TeamRepository for StoreTeamRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<Team>> {
        self.find_one("name", name).await
    }

    async fn find_by_session_token(&self, token: &str) -> Result<Option<Team>> {
        self.find_one("session_id", token).await
    }

    async fn create(&self, name: &str) -> Result<Team> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("team name must not be empty".to_string()));
        }

        let mut row = Row::new();
        row.insert("name".to_string(), json!(name));
        row.insert("session_id".to_string(), json!(generate_token()));

        let team: Team = decode(self.rows.insert(Collection::Teams, row).await?)?;
        tracing::info!("Team created: {}", team.name);
        Ok(team)
    }
}
