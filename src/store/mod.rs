use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::types::ToSql;

use crate::database::DatabaseService;
use crate::models::{Department, SubjectWithDepartment};
use crate::query::{Statement, SubjectFilter};

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Read access to subjects joined with their departments
#[async_trait]
pub trait SubjectStore: Send + Sync {
    /// Number of rows matching `filter`, ignoring pagination
    async fn count_subjects(&self, filter: &SubjectFilter) -> Result<i64, StoreError>;

    /// Matching rows, newest first, after skipping `offset` and taking `limit`
    async fn list_subjects(
        &self,
        filter: &SubjectFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SubjectWithDepartment>, StoreError>;
}

/// Postgres-backed subject store
pub struct PgSubjectStore {
    db: Arc<DatabaseService>,
}

impl PgSubjectStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Wide joined row to a subject with nested department
    fn row_to_subject(row: &tokio_postgres::Row) -> SubjectWithDepartment {
        let department = row.get::<_, Option<i32>>(7).map(|id| Department {
            id,
            code: row.get(8),
            name: row.get(9),
            description: row.get(10),
            created_at: row.get(11),
            updated_at: row.get(12),
        });

        SubjectWithDepartment {
            id: row.get(0),
            department_id: row.get(1),
            name: row.get(2),
            code: row.get(3),
            description: row.get(4),
            created_at: row.get(5),
            updated_at: row.get(6),
            department,
        }
    }
}

fn bind(statement: &Statement) -> Vec<&(dyn ToSql + Sync)> {
    statement
        .params
        .iter()
        .map(|p| p as &(dyn ToSql + Sync))
        .collect()
}

#[async_trait]
impl SubjectStore for PgSubjectStore {
    async fn count_subjects(&self, filter: &SubjectFilter) -> Result<i64, StoreError> {
        let client = self.db.get_client().await?;
        let statement = filter.count_statement();

        let row = client.query_one(statement.sql.as_str(), &bind(&statement)).await?;
        Ok(row.get(0))
    }

    async fn list_subjects(
        &self,
        filter: &SubjectFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SubjectWithDepartment>, StoreError> {
        let client = self.db.get_client().await?;
        let statement = filter.page_statement();

        let mut params = bind(&statement);
        params.push(&limit);
        params.push(&offset);

        let rows = client.query(statement.sql.as_str(), &params).await?;
        Ok(rows.iter().map(Self::row_to_subject).collect())
    }
}
