//! End-to-end runs against the in-memory store.

use bytes::Bytes;
use icenet_common::Hemisphere;
use ingestion::{IngestionConfig, IngestionError, Pipeline};
use std::sync::Arc;
use storage::{MemoryStore, RetryPolicy};
use test_utils::{date, FailurePoint, FlakyConnector, ForecastFixture};

fn config(batch_size: usize) -> IngestionConfig {
    IngestionConfig {
        batch_size,
        retry: RetryPolicy::new(2, 0.0).unwrap(),
        ..IngestionConfig::default()
    }
}

fn pipeline(store: &MemoryStore) -> Pipeline {
    Pipeline::new(Arc::new(store.clone()), config(100)).unwrap()
}

// =============================================================================
// Construction
// =============================================================================

#[test]
fn test_construction_validates_both_table_sets() {
    let pipeline = pipeline(&MemoryStore::new());
    let names: Vec<(&str, &str, &str)> = pipeline
        .tables()
        .iter()
        .map(|t| (t.cell_table.as_str(), t.forecast_table.as_str(), t.latest_view.as_str()))
        .collect();
    assert_eq!(
        names,
        vec![
            ("north_cell", "north_forecast", "north_forecast_latest"),
            ("south_cell", "south_forecast", "south_forecast_latest"),
        ]
    );
}

#[tokio::test]
async fn test_construction_rejects_bad_role_before_any_connection() {
    let store = MemoryStore::new();
    let config = IngestionConfig {
        reader_role: Some("reader; DROP TABLE north_cell".to_string()),
        ..config(100)
    };

    let err = Pipeline::new(Arc::new(store.clone()), config).err().unwrap();
    assert!(matches!(err, IngestionError::InvalidConfig(_)));
    assert_eq!(store.connection_count().await, 0);
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn test_north_example_end_to_end() {
    let store = MemoryStore::new();
    let summary = pipeline(&store)
        .process_dataset(ForecastFixture::north_example().build(), "north.nc")
        .await
        .unwrap();

    assert_eq!(summary.hemisphere, Hemisphere::North);
    assert_eq!(summary.cells.rows_attempted, 6);
    assert_eq!(summary.forecasts.rows_attempted, 1);
    assert_eq!(summary.join_mismatches, 0);
    assert_eq!(summary.samples_dropped, 5);

    assert_eq!(store.row_count("north_cell").await, 6);
    let forecasts = store.rows("north_forecast").await;
    assert_eq!(forecasts.len(), 1);
    assert_eq!(forecasts[0]["date_forecast_generated"].as_date(), Some(date(2024, 1, 1)));
    assert_eq!(forecasts[0]["date_forecast_for"].as_date(), Some(date(2024, 1, 2)));

    // The forecast references the cell centred on (0 m, -100000 m)
    let cell_id = forecasts[0]["cell_id"].as_i32().unwrap();
    let cells = store.rows("north_cell").await;
    let cell = cells
        .iter()
        .find(|c| c["cell_id"].as_i32() == Some(cell_id))
        .unwrap();
    assert_eq!(cell["centroid_x"].as_i32(), Some(0));
    assert_eq!(cell["centroid_y"].as_i32(), Some(-100_000));

    let meta = store.rows("forecast_meta").await;
    assert_eq!(meta.len(), 1);
    assert_eq!(meta[0]["hemisphere"].as_text(), Some("north"));
    assert_eq!(meta[0]["n_records"].as_i64(), Some(1));
    assert_eq!(meta[0]["date_forecast_first"].as_date(), Some(date(2024, 1, 2)));
    assert_eq!(meta[0]["date_forecast_last"].as_date(), Some(date(2024, 1, 2)));

    let scripts = store.executed_scripts().await;
    assert!(scripts.iter().any(|s| s == "REFRESH MATERIALIZED VIEW north_forecast_latest"));
}

#[tokio::test]
async fn test_small_batches() {
    let store = MemoryStore::new();
    let summary = Pipeline::new(Arc::new(store.clone()), config(4))
        .unwrap()
        .process_dataset(ForecastFixture::north_example().filled(0.5, 0.1).build(), "north.nc")
        .await
        .unwrap();

    assert_eq!(summary.cells.batches, 2);
    assert_eq!(summary.forecasts.batches, 2);
    assert_eq!(store.row_count("north_forecast").await, 6);
}

#[tokio::test]
async fn test_second_identical_run_changes_nothing() {
    let store = MemoryStore::new();
    let pipeline = pipeline(&store);
    let fixture = ForecastFixture::north_example().with_leadtimes(vec![1, 2]).filled(0.4, 0.2);

    pipeline.process_dataset(fixture.build(), "a.nc").await.unwrap();
    let cells = store.row_count("north_cell").await;
    let forecasts = store.row_count("north_forecast").await;

    let again = pipeline.process_dataset(fixture.build(), "a.nc").await.unwrap();

    assert_eq!(again.cells.rows_affected, 0);
    assert_eq!(again.forecasts.rows_affected, 0);
    assert_eq!(store.row_count("north_cell").await, cells);
    assert_eq!(store.row_count("north_forecast").await, forecasts);

    let meta = store.rows("forecast_meta").await;
    assert_eq!(meta.len(), 1);
    assert_eq!(meta[0]["n_records"].as_i64(), Some(forecasts as i64));
}

#[tokio::test]
async fn test_later_generation_reuses_cells() {
    let store = MemoryStore::new();
    let pipeline = pipeline(&store);

    pipeline
        .process_dataset(ForecastFixture::north_example().build(), "day1.nc")
        .await
        .unwrap();
    let summary = pipeline
        .process_dataset(
            ForecastFixture::north_example()
                .generated_on(vec![date(2024, 1, 2)])
                .build(),
            "day2.nc",
        )
        .await
        .unwrap();

    assert_eq!(summary.cells.rows_affected, 0);
    assert_eq!(store.row_count("north_cell").await, 6);
    assert_eq!(store.row_count("north_forecast").await, 2);
    assert_eq!(store.row_count("forecast_meta").await, 2);
}

#[tokio::test]
async fn test_hemispheres_run_concurrently() {
    let store = MemoryStore::new();
    let pipeline = pipeline(&store);

    let (north, south) = tokio::join!(
        pipeline.process_dataset(ForecastFixture::north_example().build(), "north.nc"),
        pipeline.process_dataset(ForecastFixture::south_example().build(), "south.nc"),
    );

    assert_eq!(north.unwrap().hemisphere, Hemisphere::North);
    assert_eq!(south.unwrap().hemisphere, Hemisphere::South);
    assert_eq!(store.row_count("north_cell").await, 6);
    assert_eq!(store.row_count("south_cell").await, 6);

    let mut hemispheres: Vec<String> = store
        .rows("forecast_meta")
        .await
        .iter()
        .filter_map(|row| row["hemisphere"].as_text().map(str::to_string))
        .collect();
    hemispheres.sort();
    assert_eq!(hemispheres, vec!["north", "south"]);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_undetermined_hemisphere_writes_nothing() {
    let store = MemoryStore::new();
    let dataset = ForecastFixture::new(vec![0.0, 25.0], vec![0.0, 25.0]).filled(0.5, 0.1).build();

    let err = pipeline(&store).process_dataset(dataset, "mystery.nc").await.unwrap_err();

    assert!(matches!(err, IngestionError::HemisphereUndetermined { .. }));
    assert_eq!(store.connection_count().await, 0);
    assert_eq!(store.statement_count().await, 0);
}

#[tokio::test]
async fn test_undecodable_buffer_writes_nothing() {
    let store = MemoryStore::new();

    let err = pipeline(&store)
        .process(Bytes::from_static(b"CDF\x01 truncated"), "broken.nc")
        .await
        .unwrap_err();

    assert!(matches!(err, IngestionError::Decode(_)));
    assert_eq!(store.statement_count().await, 0);
}

#[tokio::test]
async fn test_unreachable_store_is_a_persistence_error() {
    let connector = FlakyConnector::always_failing(MemoryStore::new(), FailurePoint::Connect);
    let pipeline = Pipeline::new(Arc::new(connector.clone()), config(100)).unwrap();

    let err = pipeline
        .process_dataset(ForecastFixture::north_example().build(), "north.nc")
        .await
        .unwrap_err();

    assert!(matches!(err, IngestionError::Persistence(_)));
    assert_eq!(connector.attempt_count().await, 3);
}

#[tokio::test]
async fn test_transient_store_failures_are_absorbed() {
    let connector = FlakyConnector::failing_first(MemoryStore::new(), 2, FailurePoint::Execute);
    let pipeline = Pipeline::new(Arc::new(connector.clone()), config(100)).unwrap();

    pipeline
        .process_dataset(ForecastFixture::north_example().build(), "north.nc")
        .await
        .unwrap();

    assert_eq!(connector.store().row_count("north_cell").await, 6);
    assert_eq!(connector.store().row_count("forecast_meta").await, 1);
}

#[tokio::test]
async fn test_transient_read_failures_are_absorbed() {
    let connector = FlakyConnector::failing_first(MemoryStore::new(), 2, FailurePoint::Read);
    let pipeline = Pipeline::new(Arc::new(connector.clone()), config(100)).unwrap();

    let summary = pipeline
        .process_dataset(ForecastFixture::north_example().build(), "north.nc")
        .await
        .unwrap();

    assert_eq!(summary.join_mismatches, 0);
    assert_eq!(connector.store().row_count("north_forecast").await, 1);
}
