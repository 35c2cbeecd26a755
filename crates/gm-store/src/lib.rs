#![forbid(unsafe_code)]

//! Owner of the base table.
//!
//! The joined measurement table is loaded eagerly and held behind an
//! `Arc`. Readers clone the `Arc` and keep working on that snapshot even
//! while [`DatasetStore::reload`] installs a new one.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use gm_frame::Table;
use gm_io::{IoError, LocationColumns, ReadOptions, read_locations_path, read_table_path};
use gm_join::{JoinError, join_on_key};
use gm_runtime::{AppConfig, ColumnConfig};
use gm_types::DType;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DataLoadError {
    #[error("cannot read measurement data {path}: {source}")]
    Measurements {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    #[error("cannot read station locations {path}: {source}")]
    Locations {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    #[error("station locations {path}: station '{station}' is listed again on line {line}")]
    DuplicateLocation {
        path: PathBuf,
        station: String,
        line: usize,
    },
    #[error("measurement data {path} has no '{column}' column")]
    MissingColumn { path: PathBuf, column: String },
    #[error(transparent)]
    Join(#[from] JoinError),
    #[error("no measurement rows matched a station location ({measurements} measurements, {locations} locations)")]
    EmptyJoin {
        measurements: usize,
        locations: usize,
    },
    #[error("reloaded dataset schema differs from the loaded one: {detail}")]
    SchemaChanged { detail: String },
}

/// Read the measurement data and the location file, then inner-join them on
/// the station column.
pub fn load(
    dataset_path: &Path,
    locations_path: &Path,
    columns: &ColumnConfig,
) -> Result<Table, DataLoadError> {
    let options = ReadOptions::default().with_string_column(columns.station.clone());
    let measurements =
        read_table_path(dataset_path, &options).map_err(|source| DataLoadError::Measurements {
            path: dataset_path.to_owned(),
            source,
        })?;

    for required in [&columns.station, &columns.measure] {
        if measurements.column(required).is_none() {
            return Err(DataLoadError::MissingColumn {
                path: dataset_path.to_owned(),
                column: required.clone(),
            });
        }
    }

    let names = LocationColumns {
        longitude: columns.longitude.clone(),
        latitude: columns.latitude.clone(),
        station: columns.station.clone(),
    };
    let locations = read_locations_path(locations_path, &names).map_err(|source| match source {
        IoError::DuplicateStation { station, line, .. } => DataLoadError::DuplicateLocation {
            path: locations_path.to_owned(),
            station,
            line,
        },
        source => DataLoadError::Locations {
            path: locations_path.to_owned(),
            source,
        },
    })?;

    let joined = join_on_key(&measurements, &locations, &columns.station)?;
    if joined.is_empty() {
        return Err(DataLoadError::EmptyJoin {
            measurements: measurements.len(),
            locations: locations.len(),
        });
    }

    let dropped = measurements.len().saturating_sub(joined.len());
    if dropped > 0 {
        warn!(
            dataset = %dataset_path.display(),
            dropped,
            "measurement rows without a station location were dropped"
        );
    }
    Ok(joined)
}

pub struct DatasetStore {
    dataset_path: PathBuf,
    locations_path: PathBuf,
    columns: ColumnConfig,
    current: RwLock<Arc<Table>>,
}

impl std::fmt::Debug for DatasetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetStore")
            .field("dataset_path", &self.dataset_path)
            .field("locations_path", &self.locations_path)
            .field("rows", &self.snapshot().len())
            .finish_non_exhaustive()
    }
}

impl DatasetStore {
    /// Load the configured sources. Fails instead of starting with no data.
    pub fn open(config: &AppConfig) -> Result<Self, DataLoadError> {
        let table = load(&config.dataset_path, &config.locations_path, &config.columns)?;
        info!(
            dataset = %config.dataset_path.display(),
            rows = table.len(),
            columns = table.columns().len(),
            "dataset loaded"
        );
        Ok(Self::from_table(config, table))
    }

    /// Wrap an already-built table. `reload` still reads the configured paths.
    #[must_use]
    pub fn from_table(config: &AppConfig, table: Table) -> Self {
        Self {
            dataset_path: config.dataset_path.clone(),
            locations_path: config.locations_path.clone(),
            columns: config.columns.clone(),
            current: RwLock::new(Arc::new(table)),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<Table> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Re-read the sources and install the result. A table whose column
    /// names or dtypes differ from the current snapshot is rejected and the
    /// current snapshot stays in place.
    pub fn reload(&self) -> Result<Arc<Table>, DataLoadError> {
        let fresh = Arc::new(load(
            &self.dataset_path,
            &self.locations_path,
            &self.columns,
        )?);

        let previous = self.snapshot();
        let (old_schema, new_schema) = (previous.schema(), fresh.schema());
        if old_schema != new_schema {
            let detail = describe_schema_change(&old_schema, &new_schema);
            warn!(%detail, "reload rejected");
            return Err(DataLoadError::SchemaChanged { detail });
        }

        {
            let mut guard = self
                .current
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = Arc::clone(&fresh);
        }
        info!(
            previous_rows = previous.len(),
            rows = fresh.len(),
            "dataset reloaded"
        );
        Ok(fresh)
    }
}

fn describe_schema_change(old: &[(String, DType)], new: &[(String, DType)]) -> String {
    let mut changes = Vec::new();
    for (name, dtype) in old {
        match new.iter().find(|(other, _)| other == name) {
            None => changes.push(format!("'{name}' removed")),
            Some((_, other)) if other != dtype => {
                changes.push(format!("'{name}' changed from {dtype} to {other}"));
            }
            Some(_) => {}
        }
    }
    for (name, _) in new {
        if !old.iter().any(|(other, _)| other == name) {
            changes.push(format!("'{name}' added"));
        }
    }
    changes.join(", ")
}

#[cfg(test)]
mod tests {
    use gm_types::DType;

    use super::describe_schema_change;

    #[test]
    fn schema_change_lists_every_difference() {
        let old = vec![
            ("imt".to_owned(), DType::Utf8),
            ("rotd50".to_owned(), DType::Float64),
            ("size".to_owned(), DType::Int64),
        ];
        let new = vec![
            ("imt".to_owned(), DType::Utf8),
            ("rotd50".to_owned(), DType::Utf8),
            ("vs30".to_owned(), DType::Float64),
        ];
        assert_eq!(
            describe_schema_change(&old, &new),
            "'rotd50' changed from float64 to str, 'size' removed, 'vs30' added"
        );
    }
}
