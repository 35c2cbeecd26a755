use std::fs;
use std::path::Path;
use std::sync::Arc;

use gm_runtime::{AppConfig, ColumnConfig};
use gm_store::{DataLoadError, DatasetStore, load};
use gm_types::{DType, Scalar};

const READINGS: &str = "\
,station,imt,rotd50,rotd100
0,A,PGA,1.0,1.2
1,B,PGA,2.0,2.8
2,C,PGA,3.0,3.3
3,Z,PGA,9.0,9.9
";

const LOCATIONS: &str = "\
# lon lat station
-117.1 34.0 A
-117.2 34.1 B
-117.3 34.2 C
";

fn write_instance(dir: &Path, readings: &str, locations: &str) -> AppConfig {
    fs::write(dir.join("readings.csv"), readings).expect("write readings");
    fs::write(dir.join("locations.txt"), locations).expect("write locations");
    AppConfig::from_instance_dir(dir).with_dataset_path(dir.join("readings.csv"))
}

#[test]
fn load_joins_locations_and_drops_unlocated_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_instance(dir.path(), READINGS, LOCATIONS);

    let table = load(&config.dataset_path, &config.locations_path, &config.columns).expect("load");
    assert_eq!(table.len(), 3);
    assert_eq!(
        table.column("station").expect("station").values(),
        &[Scalar::from("A"), Scalar::from("B"), Scalar::from("C")]
    );
    assert_eq!(table.column("lat").expect("lat").dtype(), DType::Float64);
    assert_eq!(table.column("lon").expect("lon").values()[1], Scalar::Float64(-117.2));
    // The unnamed pandas index column is not part of the schema.
    assert!(table.column("").is_none());
}

#[test]
fn numeric_station_codes_still_join() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_instance(
        dir.path(),
        "station,imt,rotd50\n0012,PGA,1.0\n",
        "10.0 20.0 0012\n",
    );
    let table = load(&config.dataset_path, &config.locations_path, &config.columns).expect("load");
    assert_eq!(table.len(), 1);
    assert_eq!(table.column("station").expect("station").values()[0], Scalar::from("0012"));
}

#[test]
fn missing_measure_column_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_instance(dir.path(), "station,rotd50\nA,1.0\n", LOCATIONS);
    let err = load(&config.dataset_path, &config.locations_path, &config.columns)
        .expect_err("no imt column");
    assert!(matches!(err, DataLoadError::MissingColumn { column, .. } if column == "imt"));
}

#[test]
fn missing_sources_are_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = AppConfig::from_instance_dir(dir.path());
    let err = DatasetStore::open(&config).expect_err("no files");
    assert!(matches!(err, DataLoadError::Measurements { .. }));

    fs::write(dir.path().join("readings.csv"), READINGS).expect("write");
    let config = config.with_dataset_path(dir.path().join("readings.csv"));
    let err = DatasetStore::open(&config).expect_err("no locations");
    assert!(matches!(err, DataLoadError::Locations { .. }));
}

#[test]
fn malformed_location_file_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_instance(dir.path(), READINGS, "-117.1 34.0\n");
    let err = DatasetStore::open(&config).expect_err("two fields");
    assert!(matches!(err, DataLoadError::Locations { .. }));
}

#[test]
fn repeated_location_station_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_instance(
        dir.path(),
        "station,imt,rotd50\nA,PGA,1.0\nB,PGA,2.0\n",
        "-117.1 34.0 A\n-117.5 34.5 A\n-117.2 34.1 B\n",
    );
    let err = load(&config.dataset_path, &config.locations_path, &config.columns)
        .expect_err("station A listed twice");
    assert!(matches!(
        err,
        DataLoadError::DuplicateLocation { ref station, line: 2, .. } if station == "A"
    ));
    assert!(err.to_string().contains("station 'A' is listed again on line 2"));
}

#[test]
fn empty_join_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_instance(dir.path(), READINGS, "1.0 2.0 Q\n");
    let err = DatasetStore::open(&config).expect_err("nothing joins");
    assert!(matches!(
        err,
        DataLoadError::EmptyJoin {
            measurements: 4,
            locations: 1
        }
    ));
}

#[test]
fn unknown_extension_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("readings.json"), "{}").expect("write");
    let columns = ColumnConfig::default();
    let err = load(
        &dir.path().join("readings.json"),
        &dir.path().join("locations.txt"),
        &columns,
    )
    .expect_err("json");
    assert!(matches!(err, DataLoadError::Measurements { .. }));
}

#[test]
fn reload_swaps_snapshot_without_touching_held_ones() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_instance(dir.path(), READINGS, LOCATIONS);
    let store = DatasetStore::open(&config).expect("open");

    let before = store.snapshot();
    assert_eq!(before.len(), 3);

    fs::write(
        dir.path().join("locations.txt"),
        format!("{LOCATIONS}-117.9 34.9 Z\n"),
    )
    .expect("rewrite locations");
    let fresh = store.reload().expect("reload");

    assert_eq!(fresh.len(), 4);
    assert_eq!(store.snapshot().len(), 4);
    assert!(Arc::ptr_eq(&fresh, &store.snapshot()));
    assert_eq!(before.len(), 3);
}

#[test]
fn reload_with_changed_schema_keeps_old_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_instance(dir.path(), READINGS, LOCATIONS);
    let store = DatasetStore::open(&config).expect("open");
    let before = store.snapshot();

    fs::write(
        dir.path().join("readings.csv"),
        "station,imt,rotd50,vs30\nA,PGA,1.0,760\n",
    )
    .expect("rewrite readings");
    let err = store.reload().expect_err("schema changed");
    match err {
        DataLoadError::SchemaChanged { detail } => {
            assert!(detail.contains("'vs30' added"), "{detail}");
            assert!(detail.contains("'rotd100' removed"), "{detail}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(Arc::ptr_eq(&before, &store.snapshot()));
}

#[test]
fn concurrent_readers_see_complete_snapshots() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_instance(dir.path(), READINGS, LOCATIONS);
    let store = DatasetStore::open(&config).expect("open");

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..50 {
                    let snapshot = store.snapshot();
                    assert_eq!(snapshot.len(), 3);
                    assert_eq!(snapshot.column("lat").expect("lat").len(), 3);
                }
            });
        }
        scope.spawn(|| {
            for _ in 0..5 {
                store.reload().expect("reload");
            }
        });
    });
}
