//! PostgreSQL/PostGIS backend.

use async_trait::async_trait;
use chrono::NaiveDate;
use icenet_common::Identifier;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::error::StorageResult;
use crate::schema::{CellKey, ForecastSummary};
use crate::session::{Connector, StoreConnection};
use crate::statement::{ColumnValues, Statement};

/// Opens one dedicated connection per session.
pub struct PgConnector {
    options: PgConnectOptions,
    description: String,
}

impl PgConnector {
    pub fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        config.validate()?;
        Ok(Self {
            options: config.connect_options(),
            description: config.describe(),
        })
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> StorageResult<Box<dyn StoreConnection>> {
        let conn = PgConnection::connect_with(&self.options).await?;
        debug!(database = %self.description, "Connected to PostgreSQL");
        Ok(Box::new(PgStoreConnection { conn }))
    }

    fn describe(&self) -> String {
        format!("postgres://{}", self.description)
    }
}

struct PgStoreConnection {
    conn: PgConnection,
}

#[async_trait]
impl StoreConnection for PgStoreConnection {
    async fn execute(&mut self, statement: &Statement) -> StorageResult<u64> {
        let mut tx = self.conn.begin().await?;

        let rows = match statement {
            Statement::Script { commands, .. } => {
                let mut rows = 0;
                for command in commands {
                    rows += sqlx::query(command).execute(&mut *tx).await?.rows_affected();
                }
                rows
            }
            Statement::Insert(batch) => {
                batch.row_count()?;
                let sql = batch.to_sql();
                let mut query = sqlx::query(&sql);
                for column in &batch.columns {
                    query = match &column.values {
                        ColumnValues::Int4(v) => query.bind(v),
                        ColumnValues::Int8(v) => query.bind(v),
                        ColumnValues::Float4(v) => query.bind(v),
                        ColumnValues::Date(v) => query.bind(v),
                        ColumnValues::Text(v) => query.bind(v),
                        ColumnValues::Geometry { wkt, .. } => query.bind(wkt),
                    };
                }
                query.execute(&mut *tx).await?.rows_affected()
            }
        };

        tx.commit().await?;
        Ok(rows)
    }

    async fn load_cells(&mut self, table: &Identifier) -> StorageResult<Vec<CellKey>> {
        let sql = format!("SELECT cell_id, centroid_x, centroid_y FROM {table}");
        let rows: Vec<(i32, i32, i32)> = sqlx::query_as(&sql).fetch_all(&mut self.conn).await?;

        Ok(rows
            .into_iter()
            .map(|(cell_id, centroid_x, centroid_y)| CellKey {
                cell_id,
                centroid_x,
                centroid_y,
            })
            .collect())
    }

    async fn forecast_summary(
        &mut self,
        table: &Identifier,
        generated: NaiveDate,
    ) -> StorageResult<Option<ForecastSummary>> {
        let sql = format!(
            "SELECT min(date_forecast_for), max(date_forecast_for), count(*) \
             FROM {table} WHERE date_forecast_generated = $1"
        );
        let (first, last, n_records): (Option<NaiveDate>, Option<NaiveDate>, i64) = sqlx::query_as(&sql)
            .bind(generated)
            .fetch_one(&mut self.conn)
            .await?;

        Ok(match (first, last) {
            (Some(first), Some(last)) if n_records > 0 => Some(ForecastSummary {
                first,
                last,
                n_records,
            }),
            _ => None,
        })
    }

    async fn close(self: Box<Self>) -> StorageResult<()> {
        let PgStoreConnection { conn } = *self;
        conn.close().await?;
        Ok(())
    }
}
