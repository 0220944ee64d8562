use async_trait::async_trait;
use insight_core::{CapabilityError, DataSource, Dataset, Scalar, TabularResult};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Executor, Row, TypeInfo, ValueRef};

use crate::errors::DbError;
use crate::schema::HR_TABLE;
use crate::DbPool;

const CAPABILITY: &str = "data_source";

/// Runs generated queries against sqlite. Each query executes inside a transaction
/// that is always rolled back.
#[derive(Clone)]
pub struct SqlDataSource {
    pool: DbPool,
}

impl SqlDataSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn query_table(&self, query: &str) -> Result<TabularResult, DbError> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(query).fetch_all(&mut *tx).await?;

        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(|column| column.name().to_owned()).collect(),
            None => (&mut *tx)
                .describe(query)
                .await?
                .columns()
                .iter()
                .map(|column| column.name().to_owned())
                .collect::<Vec<_>>(),
        };
        tx.rollback().await?;

        let records = rows
            .iter()
            .map(|row| (0..columns.len()).map(|index| scalar_at(row, index)).collect())
            .collect::<Result<Vec<Vec<Scalar>>, sqlx::Error>>()?;

        TabularResult::from_records(query, columns, records)
            .map_err(|error| DbError::Decode(error.to_string()))
    }
}

fn scalar_at(row: &SqliteRow, index: usize) -> Result<Scalar, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Scalar::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    match type_name.as_str() {
        "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => row.try_get::<i64, _>(index).map(Scalar::Integer),
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => row.try_get::<f64, _>(index).map(Scalar::Real),
        "BLOB" => Ok(Scalar::Text("<blob>".to_owned())),
        _ => row.try_get::<String, _>(index).map(Scalar::Text),
    }
}

#[async_trait]
impl DataSource for SqlDataSource {
    async fn execute(&self, query: &str) -> Result<TabularResult, CapabilityError> {
        self.query_table(query).await.map_err(|error| match error {
            DbError::Database(sqlx::Error::PoolTimedOut) => {
                CapabilityError::unavailable(CAPABILITY, "connection pool timed out")
            }
            other => CapabilityError::rejected(CAPABILITY, other.to_string()),
        })
    }
}

/// Loads the whole HR table into memory for significance testing.
pub async fn load_dataset(pool: &DbPool) -> Result<Dataset, DbError> {
    let table = SqlDataSource::new(pool.clone())
        .query_table(&format!("SELECT * FROM {HR_TABLE} ORDER BY employeenumber"))
        .await?;
    Ok(Dataset::from_table(&table))
}
