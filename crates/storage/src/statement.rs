//! Statements submitted through a [`crate::ResilientSession`].
//!
//! Identifiers in a statement come from validated [`Identifier`]s or fixed
//! column names; row values travel as typed column arrays and are always
//! bound, never spliced into SQL text.

use chrono::NaiveDate;
use icenet_common::Identifier;

use crate::error::{StorageError, StorageResult};

/// A unit of work executed and committed as one transaction.
#[derive(Debug, Clone)]
pub enum Statement {
    /// Fixed DDL/maintenance commands, run in order
    Script { label: String, commands: Vec<String> },
    /// Multi-row insert
    Insert(InsertBatch),
}

impl Statement {
    pub fn script(label: impl Into<String>, commands: Vec<String>) -> Self {
        Statement::Script {
            label: label.into(),
            commands,
        }
    }

    /// Short description for log lines and errors.
    pub fn label(&self) -> String {
        match self {
            Statement::Script { label, .. } => label.clone(),
            Statement::Insert(batch) => format!("insert into {}", batch.table),
        }
    }
}

/// One column of values, typed by its PostgreSQL array type.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Int4(Vec<i32>),
    Int8(Vec<i64>),
    Float4(Vec<f32>),
    Date(Vec<NaiveDate>),
    Text(Vec<String>),
    /// WKT text parsed server-side into a geometry with this SRID
    Geometry { srid: u32, wkt: Vec<String> },
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Int4(v) => v.len(),
            ColumnValues::Int8(v) => v.len(),
            ColumnValues::Float4(v) => v.len(),
            ColumnValues::Date(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
            ColumnValues::Geometry { wkt, .. } => wkt.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn array_type(&self) -> &'static str {
        match self {
            ColumnValues::Int4(_) => "int4[]",
            ColumnValues::Int8(_) => "int8[]",
            ColumnValues::Float4(_) => "float4[]",
            ColumnValues::Date(_) => "date[]",
            ColumnValues::Text(_) | ColumnValues::Geometry { .. } => "text[]",
        }
    }

    fn select_expr(&self, column: &str) -> String {
        match self {
            ColumnValues::Geometry { srid, .. } => format!("ST_GeomFromText(t.{column}, {srid})"),
            _ => format!("t.{column}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnData {
    pub name: &'static str,
    pub values: ColumnValues,
}

/// Column with no bound values, filled by reprojecting a geometry column
/// with PostGIS `ST_Transform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformedColumn {
    pub name: &'static str,
    pub source: &'static str,
    pub srid: u32,
}

/// Conflict handling on the natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Keep the existing row
    DoNothing,
    /// Replace every non-key column
    UpdateAll,
}

/// Rows for one table, column-major.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertBatch {
    pub table: Identifier,
    pub columns: Vec<ColumnData>,
    pub transformed: Vec<TransformedColumn>,
    pub conflict_key: Vec<&'static str>,
    pub on_conflict: OnConflict,
    /// Serial column filled in by the store on insert
    pub generated_key: Option<&'static str>,
}

impl InsertBatch {
    pub fn new(table: Identifier, conflict_key: Vec<&'static str>, on_conflict: OnConflict) -> Self {
        Self {
            table,
            columns: Vec::new(),
            transformed: Vec::new(),
            conflict_key,
            on_conflict,
            generated_key: None,
        }
    }

    pub fn column(mut self, name: &'static str, values: ColumnValues) -> Self {
        self.columns.push(ColumnData { name, values });
        self
    }

    /// Add `name`, computed as `source` reprojected to `srid`.
    pub fn transformed(mut self, name: &'static str, source: &'static str, srid: u32) -> Self {
        self.transformed.push(TransformedColumn { name, source, srid });
        self
    }

    pub fn generated_key(mut self, name: &'static str) -> Self {
        self.generated_key = Some(name);
        self
    }

    /// Number of rows, checking that the batch is well formed: every column
    /// has the same length, every conflict-key column is present and every
    /// transformed column reads from a geometry column.
    pub fn row_count(&self) -> StorageResult<usize> {
        let invalid = |message: String| StorageError::InvalidStatement {
            table: self.table.to_string(),
            message,
        };

        let first = self
            .columns
            .first()
            .ok_or_else(|| invalid("batch has no columns".to_string()))?;
        let rows = first.values.len();

        if let Some(col) = self.columns.iter().find(|c| c.values.len() != rows) {
            return Err(invalid(format!(
                "column {} has {} values, expected {}",
                col.name,
                col.values.len(),
                rows
            )));
        }
        if let Some(key) = self
            .conflict_key
            .iter()
            .find(|k| !self.columns.iter().any(|c| c.name == **k))
        {
            return Err(invalid(format!("conflict key column {} is missing", key)));
        }
        for derived in &self.transformed {
            let source = self.columns.iter().find(|c| c.name == derived.source);
            if !matches!(source, Some(ColumnData { values: ColumnValues::Geometry { .. }, .. })) {
                return Err(invalid(format!(
                    "column {} must be derived from a geometry column, {} is not one",
                    derived.name, derived.source
                )));
            }
        }

        Ok(rows)
    }

    /// Render the `INSERT ... SELECT ... FROM UNNEST(...)` text. Parameter
    /// `$n` is the n-th column's value array; transformed columns are
    /// computed in the select list and bind nothing.
    pub fn to_sql(&self) -> String {
        let bound: Vec<&str> = self.columns.iter().map(|c| c.name).collect();
        let names: Vec<&str> = bound
            .iter()
            .copied()
            .chain(self.transformed.iter().map(|d| d.name))
            .collect();
        let select_list = self
            .columns
            .iter()
            .map(|c| c.values.select_expr(c.name))
            .chain(self.transformed.iter().map(|d| self.transform_expr(d)))
            .collect::<Vec<_>>()
            .join(", ");
        let unnest_args = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("${}::{}", i + 1, c.values.array_type()))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "INSERT INTO {table} ({column_list}) SELECT {select_list} FROM UNNEST({unnest_args}) AS t({bound_list})",
            table = self.table,
            column_list = names.join(", "),
            bound_list = bound.join(", "),
        );

        if !self.conflict_key.is_empty() {
            sql.push_str(&format!(" ON CONFLICT ({})", self.conflict_key.join(", ")));
            let updates: Vec<String> = names
                .iter()
                .filter(|n| !self.conflict_key.iter().any(|k| *k == **n))
                .map(|n| format!("{n} = EXCLUDED.{n}"))
                .collect();
            match self.on_conflict {
                OnConflict::UpdateAll if !updates.is_empty() => {
                    sql.push_str(&format!(" DO UPDATE SET {}", updates.join(", ")));
                }
                _ => sql.push_str(" DO NOTHING"),
            }
        }

        sql
    }

    fn transform_expr(&self, derived: &TransformedColumn) -> String {
        let source = self
            .columns
            .iter()
            .find(|c| c.name == derived.source)
            .map(|c| c.values.select_expr(c.name))
            .unwrap_or_else(|| format!("t.{}", derived.source));
        format!("ST_Transform({source}, {})", derived.srid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> Identifier {
        Identifier::new(name).unwrap()
    }

    #[test]
    fn test_insert_do_nothing_sql() {
        let batch = InsertBatch::new(table("north_cell"), vec!["centroid_x", "centroid_y"], OnConflict::DoNothing)
            .column("centroid_x", ColumnValues::Int4(vec![1, 2]))
            .column("centroid_y", ColumnValues::Int4(vec![3, 4]))
            .column(
                "geom_native",
                ColumnValues::Geometry {
                    srid: 6931,
                    wkt: vec!["POLYGON EMPTY".into(), "POLYGON EMPTY".into()],
                },
            );

        assert_eq!(
            batch.to_sql(),
            "INSERT INTO north_cell (centroid_x, centroid_y, geom_native) \
             SELECT t.centroid_x, t.centroid_y, ST_GeomFromText(t.geom_native, 6931) \
             FROM UNNEST($1::int4[], $2::int4[], $3::text[]) AS t(centroid_x, centroid_y, geom_native) \
             ON CONFLICT (centroid_x, centroid_y) DO NOTHING"
        );
        assert_eq!(batch.row_count().unwrap(), 2);
    }

    #[test]
    fn test_transformed_column_is_computed_server_side() {
        let batch = InsertBatch::new(table("south_cell"), vec!["centroid_x"], OnConflict::DoNothing)
            .column("centroid_x", ColumnValues::Int4(vec![1]))
            .column(
                "geom_native",
                ColumnValues::Geometry {
                    srid: 6932,
                    wkt: vec!["POLYGON EMPTY".into()],
                },
            )
            .transformed("geom_wgs84", "geom_native", 4326);

        assert_eq!(
            batch.to_sql(),
            "INSERT INTO south_cell (centroid_x, geom_native, geom_wgs84) \
             SELECT t.centroid_x, ST_GeomFromText(t.geom_native, 6932), \
             ST_Transform(ST_GeomFromText(t.geom_native, 6932), 4326) \
             FROM UNNEST($1::int4[], $2::text[]) AS t(centroid_x, geom_native) \
             ON CONFLICT (centroid_x) DO NOTHING"
        );
        assert_eq!(batch.row_count().unwrap(), 1);
    }

    #[test]
    fn test_transformed_column_needs_geometry_source() {
        let batch = InsertBatch::new(table("t"), vec![], OnConflict::DoNothing)
            .column("a", ColumnValues::Int4(vec![1]))
            .transformed("b", "a", 4326);
        assert!(matches!(
            batch.row_count(),
            Err(StorageError::InvalidStatement { .. })
        ));

        let missing = InsertBatch::new(table("t"), vec![], OnConflict::DoNothing)
            .column("a", ColumnValues::Int4(vec![1]))
            .transformed("b", "geom", 4326);
        assert!(missing.row_count().is_err());
    }

    #[test]
    fn test_insert_update_all_sql() {
        let batch = InsertBatch::new(
            table("forecast_meta"),
            vec!["date_forecast_generated", "hemisphere"],
            OnConflict::UpdateAll,
        )
        .column("date_forecast_generated", ColumnValues::Date(vec![]))
        .column("hemisphere", ColumnValues::Text(vec![]))
        .column("n_records", ColumnValues::Int4(vec![]));

        let sql = batch.to_sql();
        assert!(sql.ends_with(
            "ON CONFLICT (date_forecast_generated, hemisphere) DO UPDATE SET n_records = EXCLUDED.n_records"
        ));
    }

    #[test]
    fn test_row_count_rejects_ragged_columns() {
        let batch = InsertBatch::new(table("t"), vec!["a"], OnConflict::DoNothing)
            .column("a", ColumnValues::Int4(vec![1, 2]))
            .column("b", ColumnValues::Float4(vec![0.5]));
        assert!(matches!(
            batch.row_count(),
            Err(StorageError::InvalidStatement { .. })
        ));
    }

    #[test]
    fn test_row_count_requires_key_columns() {
        let batch = InsertBatch::new(table("t"), vec!["missing"], OnConflict::DoNothing)
            .column("a", ColumnValues::Int4(vec![1]));
        assert!(batch.row_count().is_err());

        let empty = InsertBatch::new(table("t"), vec![], OnConflict::DoNothing);
        assert!(empty.row_count().is_err());
    }

    #[test]
    fn test_labels() {
        let batch = InsertBatch::new(table("south_forecast"), vec![], OnConflict::DoNothing);
        assert_eq!(Statement::Insert(batch).label(), "insert into south_forecast");
        assert_eq!(Statement::script("ensure schema", vec![]).label(), "ensure schema");
    }
}
