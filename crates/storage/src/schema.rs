//! Forecast schema: row types, upsert targets and DDL.

use chrono::NaiveDate;
use icenet_common::{CrsCode, Hemisphere, HemisphereTables, Identifier, FORECAST_META_TABLE};

use crate::error::StorageResult;
use crate::statement::{ColumnValues, InsertBatch, OnConflict, Statement};
use crate::upsert::UpsertTarget;

// =============================================================================
// Row types
// =============================================================================

/// One grid cell with its polygon as WKT in the hemisphere's native
/// projection. The WGS84 geometry is derived by PostGIS on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct CellRow {
    pub centroid_x: i32,
    pub centroid_y: i32,
    pub wkt_native: String,
}

/// One forecast value joined to its cell.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRow {
    pub date_forecast_generated: NaiveDate,
    pub date_forecast_for: NaiveDate,
    pub cell_id: i32,
    pub mean: f32,
    pub stddev: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastMetaRow {
    pub date_forecast_generated: NaiveDate,
    pub hemisphere: Hemisphere,
    pub date_forecast_first: NaiveDate,
    pub date_forecast_last: NaiveDate,
    pub n_records: i64,
}

/// Stored cell identity, as read back for the forecast join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellKey {
    pub cell_id: i32,
    pub centroid_x: i32,
    pub centroid_y: i32,
}

/// Aggregate over the stored forecasts of one generation date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastSummary {
    pub first: NaiveDate,
    pub last: NaiveDate,
    pub n_records: i64,
}

// =============================================================================
// Upsert targets
// =============================================================================

/// `<hemisphere>_cell`; existing cells are never modified.
#[derive(Debug, Clone)]
pub struct CellTarget {
    table: Identifier,
    native_srid: u32,
}

impl CellTarget {
    pub fn new(tables: &HemisphereTables) -> Self {
        Self {
            table: tables.cell_table.clone(),
            native_srid: tables.projection.srid(),
        }
    }
}

impl UpsertTarget for CellTarget {
    type Record = CellRow;

    fn table(&self) -> &Identifier {
        &self.table
    }

    fn to_batch(&self, records: &[CellRow]) -> InsertBatch {
        InsertBatch::new(self.table.clone(), vec!["centroid_x", "centroid_y"], OnConflict::DoNothing)
            .generated_key("cell_id")
            .column("centroid_x", ColumnValues::Int4(records.iter().map(|r| r.centroid_x).collect()))
            .column("centroid_y", ColumnValues::Int4(records.iter().map(|r| r.centroid_y).collect()))
            .column(
                "geom_native",
                ColumnValues::Geometry {
                    srid: self.native_srid,
                    wkt: records.iter().map(|r| r.wkt_native.clone()).collect(),
                },
            )
            .transformed("geom_wgs84", "geom_native", CrsCode::Epsg4326.srid())
    }
}

/// `<hemisphere>_forecast`; append-only.
#[derive(Debug, Clone)]
pub struct ForecastTarget {
    table: Identifier,
}

impl ForecastTarget {
    pub fn new(tables: &HemisphereTables) -> Self {
        Self {
            table: tables.forecast_table.clone(),
        }
    }
}

impl UpsertTarget for ForecastTarget {
    type Record = ForecastRow;

    fn table(&self) -> &Identifier {
        &self.table
    }

    fn to_batch(&self, records: &[ForecastRow]) -> InsertBatch {
        InsertBatch::new(
            self.table.clone(),
            vec!["date_forecast_generated", "date_forecast_for", "cell_id"],
            OnConflict::DoNothing,
        )
        .generated_key("forecast_id")
        .column(
            "date_forecast_generated",
            ColumnValues::Date(records.iter().map(|r| r.date_forecast_generated).collect()),
        )
        .column(
            "date_forecast_for",
            ColumnValues::Date(records.iter().map(|r| r.date_forecast_for).collect()),
        )
        .column("cell_id", ColumnValues::Int4(records.iter().map(|r| r.cell_id).collect()))
        .column(
            "sea_ice_concentration_mean",
            ColumnValues::Float4(records.iter().map(|r| r.mean).collect()),
        )
        .column(
            "sea_ice_concentration_stddev",
            ColumnValues::Float4(records.iter().map(|r| r.stddev).collect()),
        )
    }
}

/// Shared `forecast_meta`; last write wins on the full key.
#[derive(Debug, Clone)]
pub struct ForecastMetaTarget {
    table: Identifier,
}

impl ForecastMetaTarget {
    pub fn new() -> StorageResult<Self> {
        Ok(Self {
            table: Identifier::new(FORECAST_META_TABLE)?,
        })
    }
}

impl UpsertTarget for ForecastMetaTarget {
    type Record = ForecastMetaRow;

    fn table(&self) -> &Identifier {
        &self.table
    }

    fn to_batch(&self, records: &[ForecastMetaRow]) -> InsertBatch {
        InsertBatch::new(
            self.table.clone(),
            vec!["date_forecast_generated", "hemisphere"],
            OnConflict::UpdateAll,
        )
        .generated_key("forecast_meta_id")
        .column(
            "date_forecast_generated",
            ColumnValues::Date(records.iter().map(|r| r.date_forecast_generated).collect()),
        )
        .column(
            "hemisphere",
            ColumnValues::Text(records.iter().map(|r| r.hemisphere.to_string()).collect()),
        )
        .column(
            "date_forecast_first",
            ColumnValues::Date(records.iter().map(|r| r.date_forecast_first).collect()),
        )
        .column(
            "date_forecast_last",
            ColumnValues::Date(records.iter().map(|r| r.date_forecast_last).collect()),
        )
        .column("n_records", ColumnValues::Int8(records.iter().map(|r| r.n_records).collect()))
    }
}

// =============================================================================
// DDL
// =============================================================================

/// Optional roles that receive grants on everything the ingester creates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grants {
    pub reader_role: Option<Identifier>,
    pub writer_role: Option<Identifier>,
}

impl Grants {
    fn for_table(&self, table: &Identifier) -> Vec<String> {
        let mut commands = Vec::new();
        if let Some(reader) = &self.reader_role {
            commands.push(format!("GRANT SELECT ON TABLE {table} TO {reader}"));
        }
        if let Some(writer) = &self.writer_role {
            commands.push(format!("GRANT INSERT, DELETE, UPDATE ON TABLE {table} TO {writer}"));
        }
        commands
    }

    fn for_view(&self, view: &Identifier) -> Vec<String> {
        self.reader_role
            .iter()
            .map(|reader| format!("GRANT SELECT ON TABLE {view} TO {reader}"))
            .collect()
    }
}

/// Cell, forecast and metadata tables for one hemisphere, created if absent.
pub fn ensure_schema(tables: &HemisphereTables, grants: &Grants) -> StorageResult<Statement> {
    let cell = &tables.cell_table;
    let forecast = &tables.forecast_table;
    let meta = Identifier::new(FORECAST_META_TABLE)?;
    let cell_geom_idx = cell.with_suffix("geom_wgs84_idx")?;
    let forecast_date_idx = forecast.with_suffix("date_forecast_generated_idx")?;
    let srid = tables.projection.srid();

    let mut commands = vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {cell} (\
             cell_id SERIAL PRIMARY KEY, \
             centroid_x int4 NOT NULL, \
             centroid_y int4 NOT NULL, \
             geom_native geometry(Polygon, {srid}), \
             geom_wgs84 geometry(Polygon, 4326), \
             UNIQUE (centroid_x, centroid_y))"
        ),
        format!("CREATE INDEX IF NOT EXISTS {cell_geom_idx} ON {cell} USING GIST (geom_wgs84)"),
        format!(
            "CREATE TABLE IF NOT EXISTS {forecast} (\
             forecast_id SERIAL PRIMARY KEY, \
             date_forecast_generated date NOT NULL, \
             date_forecast_for date NOT NULL, \
             cell_id int4 NOT NULL REFERENCES {cell} (cell_id), \
             sea_ice_concentration_mean float4, \
             sea_ice_concentration_stddev float4, \
             UNIQUE (date_forecast_generated, date_forecast_for, cell_id), \
             CHECK (date_forecast_for >= date_forecast_generated))"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {forecast_date_idx} ON {forecast} (date_forecast_generated)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {meta} (\
             forecast_meta_id SERIAL PRIMARY KEY, \
             date_forecast_generated date NOT NULL, \
             hemisphere text NOT NULL, \
             date_forecast_first date, \
             date_forecast_last date, \
             n_records int8, \
             UNIQUE (date_forecast_generated, hemisphere))"
        ),
    ];
    commands.extend(grants.for_table(cell));
    commands.extend(grants.for_table(forecast));
    commands.extend(grants.for_table(&meta));

    Ok(Statement::script(
        format!("ensure {} schema", tables.hemisphere),
        commands,
    ))
}

/// Create the latest-forecast view if absent, then refresh it in place.
pub fn refresh_latest_view(tables: &HemisphereTables, grants: &Grants) -> StorageResult<Statement> {
    let cell = &tables.cell_table;
    let forecast = &tables.forecast_table;
    let view = &tables.latest_view;
    let generated_idx = view.with_suffix("date_forecast_generated_idx")?;
    let for_idx = view.with_suffix("date_forecast_for_idx")?;

    let mut commands = vec![
        format!(
            "CREATE MATERIALIZED VIEW IF NOT EXISTS {view} AS \
             SELECT row_number() OVER () AS forecast_latest_id, \
             f.date_forecast_generated, \
             f.date_forecast_for, \
             f.cell_id, \
             f.sea_ice_concentration_mean, \
             f.sea_ice_concentration_stddev, \
             c.centroid_x, \
             c.centroid_y, \
             c.geom_native, \
             c.geom_wgs84 \
             FROM {forecast} AS f \
             JOIN {cell} AS c ON f.cell_id = c.cell_id \
             WHERE f.date_forecast_generated = (SELECT max(date_forecast_generated) FROM {forecast})"
        ),
        format!("CREATE INDEX IF NOT EXISTS {generated_idx} ON {view} (date_forecast_generated)"),
        format!("CREATE INDEX IF NOT EXISTS {for_idx} ON {view} (date_forecast_for)"),
        format!("REFRESH MATERIALIZED VIEW {view}"),
    ];
    commands.extend(grants.for_view(view));

    Ok(Statement::script(format!("refresh {view}"), commands))
}
