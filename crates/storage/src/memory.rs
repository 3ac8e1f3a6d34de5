//! In-memory store honouring unique keys and conflict rules.
//!
//! Scripts are recorded but not interpreted. Inserts are applied row by row
//! against the batch's conflict key, so duplicate keys inside one batch behave
//! like successive statements. Transformed columns are not stored.

use async_trait::async_trait;
use chrono::NaiveDate;
use icenet_common::Identifier;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::StorageResult;
use crate::schema::{CellKey, ForecastSummary};
use crate::session::{Connector, StoreConnection};
use crate::statement::{ColumnValues, InsertBatch, OnConflict, Statement};

/// A stored cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Date(NaiveDate),
    Text(String),
}

impl Value {
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int4(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int4(v) => Some(i64::from(*v)),
            Value::Int8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    fn key_fragment(&self) -> String {
        match self {
            Value::Int4(v) => format!("i{v}"),
            Value::Int8(v) => format!("l{v}"),
            Value::Float4(v) => format!("f{}", v.to_bits()),
            Value::Date(v) => format!("d{v}"),
            Value::Text(v) => format!("t{v}"),
        }
    }
}

pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
    /// Unique indexes by key column list: rendered key -> row position
    indexes: HashMap<Vec<&'static str>, HashMap<String, usize>>,
    last_serial: i64,
}

impl Table {
    fn render_key(row: &Row, columns: &[&'static str]) -> String {
        columns
            .iter()
            .map(|c| row.get(*c).map(Value::key_fragment).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\u{1f}")
    }

    fn index(&mut self, columns: &[&'static str]) -> &mut HashMap<String, usize> {
        let rows = &self.rows;
        self.indexes.entry(columns.to_vec()).or_insert_with(|| {
            rows.iter()
                .enumerate()
                .map(|(i, row)| (Self::render_key(row, columns), i))
                .collect()
        })
    }

    /// Apply one row; returns whether a row was inserted or updated.
    fn apply(&mut self, mut row: Row, batch: &InsertBatch) -> bool {
        if !batch.conflict_key.is_empty() {
            let key = Self::render_key(&row, &batch.conflict_key);
            let existing = self.index(&batch.conflict_key).get(&key).copied();
            if let Some(position) = existing {
                return match batch.on_conflict {
                    OnConflict::DoNothing => false,
                    OnConflict::UpdateAll => {
                        let stored = &mut self.rows[position];
                        for (column, value) in row {
                            if !batch.conflict_key.iter().any(|k| *k == column.as_str()) {
                                stored.insert(column, value);
                            }
                        }
                        true
                    }
                };
            }
        }

        if let Some(serial) = batch.generated_key {
            self.last_serial += 1;
            let value = i32::try_from(self.last_serial)
                .map(Value::Int4)
                .unwrap_or(Value::Int8(self.last_serial));
            row.insert(serial.to_string(), value);
        }

        let position = self.rows.len();
        for (columns, index) in self.indexes.iter_mut() {
            index.insert(Self::render_key(&row, columns), position);
        }
        self.rows.push(row);
        true
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Table>,
    scripts: Vec<String>,
    statements: usize,
    connections: usize,
}

/// Shared in-memory database. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn row_count(&self, table: &str) -> usize {
        let state = self.state.lock().await;
        state.tables.get(table).map(|t| t.rows.len()).unwrap_or(0)
    }

    /// Snapshot of a table's rows in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        let state = self.state.lock().await;
        state.tables.get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }

    /// Every script command executed so far, in order.
    pub async fn executed_scripts(&self) -> Vec<String> {
        self.state.lock().await.scripts.clone()
    }

    /// Number of statements executed, successful or not.
    pub async fn statement_count(&self) -> usize {
        self.state.lock().await.statements
    }

    /// Number of connections opened.
    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections
    }
}

#[async_trait]
impl Connector for MemoryStore {
    async fn connect(&self) -> StorageResult<Box<dyn StoreConnection>> {
        self.state.lock().await.connections += 1;
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

struct MemoryConnection {
    state: Arc<Mutex<State>>,
}

fn batch_rows(batch: &InsertBatch, count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| {
            batch
                .columns
                .iter()
                .map(|column| {
                    let value = match &column.values {
                        ColumnValues::Int4(v) => Value::Int4(v[i]),
                        ColumnValues::Int8(v) => Value::Int8(v[i]),
                        ColumnValues::Float4(v) => Value::Float4(v[i]),
                        ColumnValues::Date(v) => Value::Date(v[i]),
                        ColumnValues::Text(v) => Value::Text(v[i].clone()),
                        ColumnValues::Geometry { wkt, .. } => Value::Text(wkt[i].clone()),
                    };
                    (column.name.to_string(), value)
                })
                .collect()
        })
        .collect()
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn execute(&mut self, statement: &Statement) -> StorageResult<u64> {
        let mut state = self.state.lock().await;
        state.statements += 1;

        match statement {
            Statement::Script { commands, .. } => {
                state.scripts.extend(commands.iter().cloned());
                Ok(0)
            }
            Statement::Insert(batch) => {
                // Validated before any row is applied so a bad batch changes nothing.
                let count = batch.row_count()?;
                let table = state.tables.entry(batch.table.to_string()).or_default();
                let affected = batch_rows(batch, count)
                    .into_iter()
                    .map(|row| table.apply(row, batch))
                    .filter(|changed| *changed)
                    .count();
                Ok(affected as u64)
            }
        }
    }

    async fn load_cells(&mut self, table: &Identifier) -> StorageResult<Vec<CellKey>> {
        let state = self.state.lock().await;
        let Some(table) = state.tables.get(table.as_str()) else {
            return Ok(Vec::new());
        };

        Ok(table
            .rows
            .iter()
            .filter_map(|row| {
                Some(CellKey {
                    cell_id: row.get("cell_id")?.as_i32()?,
                    centroid_x: row.get("centroid_x")?.as_i32()?,
                    centroid_y: row.get("centroid_y")?.as_i32()?,
                })
            })
            .collect())
    }

    async fn forecast_summary(
        &mut self,
        table: &Identifier,
        generated: NaiveDate,
    ) -> StorageResult<Option<ForecastSummary>> {
        let state = self.state.lock().await;
        let Some(table) = state.tables.get(table.as_str()) else {
            return Ok(None);
        };

        let dates: Vec<NaiveDate> = table
            .rows
            .iter()
            .filter(|row| row.get("date_forecast_generated").and_then(Value::as_date) == Some(generated))
            .filter_map(|row| row.get("date_forecast_for").and_then(Value::as_date))
            .collect();

        Ok(match (dates.iter().min(), dates.iter().max()) {
            (Some(first), Some(last)) => Some(ForecastSummary {
                first: *first,
                last: *last,
                n_records: dates.len() as i64,
            }),
            _ => None,
        })
    }

    async fn close(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}
