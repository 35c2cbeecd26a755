#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::path::Path;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use arrow::error::ArrowError;
use csv::{ReaderBuilder, WriterBuilder};
use gm_columnar::{Column, ColumnError};
use gm_frame::{FrameError, Table};
use gm_types::{DType, NullKind, Scalar};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::errors::ParquetError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("csv input has no headers")]
    MissingHeaders,
    #[error("csv header '{0}' appears more than once")]
    DuplicateHeader(String),
    #[error("unsupported table format for {path}; expected .csv or .parquet")]
    UnsupportedFormat { path: String },
    #[error("column '{column}' has unsupported arrow type {data_type}")]
    UnsupportedArrowType { column: String, data_type: String },
    #[error("location line {line}: {reason}")]
    MalformedLocation { line: usize, reason: String },
    #[error("location line {line}: station '{station}' already listed on line {first_line}")]
    DuplicateStation {
        station: String,
        line: usize,
        first_line: usize,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Arrow(#[from] ArrowError),
    #[error(transparent)]
    Parquet(#[from] ParquetError),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Options shared by the measurement readers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Columns kept as text even when every value parses as a number
    /// (station codes such as `"0012"`).
    pub string_columns: Vec<String>,
}

impl ReadOptions {
    #[must_use]
    pub fn with_string_column(mut self, name: impl Into<String>) -> Self {
        self.string_columns.push(name.into());
        self
    }

    fn forces_string(&self, name: &str) -> bool {
        self.string_columns.iter().any(|column| column == name)
    }
}

/// Column names assigned to the three unlabeled fields of a location file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationColumns {
    pub longitude: String,
    pub latitude: String,
    pub station: String,
}

/// Read a measurement table, choosing the format from the file extension.
pub fn read_table_path(path: &Path, options: &ReadOptions) -> Result<Table, IoError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("csv") => read_csv_str_with_options(&fs::read_to_string(path)?, options),
        Some("parquet" | "pq") => read_parquet_path(path, options),
        _ => Err(IoError::UnsupportedFormat {
            path: path.display().to_string(),
        }),
    }
}

pub fn read_csv_str(input: &str) -> Result<Table, IoError> {
    read_csv_str_with_options(input, &ReadOptions::default())
}

pub fn read_csv_str_with_options(input: &str, options: &ReadOptions) -> Result<Table, IoError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let headers = reader.headers().cloned().map_err(IoError::from)?;

    if headers.is_empty() {
        return Err(IoError::MissingHeaders);
    }

    // An empty header is the unnamed row-index column pandas writes; skip it.
    let mut kept = Vec::<(usize, String)>::new();
    for (idx, name) in headers.iter().enumerate() {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if kept.iter().any(|(_, existing)| existing == name) {
            return Err(IoError::DuplicateHeader(name.to_owned()));
        }
        kept.push((idx, name.to_owned()));
    }
    if kept.is_empty() {
        return Err(IoError::MissingHeaders);
    }

    let mut raw = kept
        .iter()
        .map(|_| Vec::<String>::new())
        .collect::<Vec<_>>();

    for row in reader.records() {
        let record = row?;
        for ((idx, _), cells) in kept.iter().zip(raw.iter_mut()) {
            cells.push(record.get(*idx).unwrap_or_default().trim().to_owned());
        }
    }

    let mut columns = BTreeMap::new();
    for ((_, name), cells) in kept.into_iter().zip(raw) {
        let column = if options.forces_string(&name) {
            text_column(cells)?
        } else {
            let values = cells.iter().map(|cell| parse_scalar(cell)).collect();
            // Mixed text and numbers fall back to a text column.
            match Column::from_values(values) {
                Ok(column) => column,
                Err(ColumnError::Type(_)) => text_column(cells)?,
                Err(other) => return Err(other.into()),
            }
        };
        columns.insert(name, column);
    }

    Ok(Table::new(columns)?)
}

fn text_column(cells: Vec<String>) -> Result<Column, IoError> {
    let values = cells
        .into_iter()
        .map(|cell| {
            if cell.is_empty() {
                Scalar::Null(NullKind::Null)
            } else {
                Scalar::Utf8(cell)
            }
        })
        .collect();
    Ok(Column::new(DType::Utf8, values)?)
}

/// Read a whitespace-delimited location file: `longitude latitude station`
/// per line, no header. Blank lines and `#` comments are skipped. A station
/// may appear only once.
pub fn read_locations_str(input: &str, names: &LocationColumns) -> Result<Table, IoError> {
    let mut longitudes = Vec::new();
    let mut latitudes = Vec::new();
    let mut stations = Vec::new();
    let mut seen: HashMap<&str, usize> = HashMap::new();

    for (line_idx, line) in input.lines().enumerate() {
        let line_no = line_idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields = trimmed.split_whitespace().collect::<Vec<_>>();
        let [lon, lat, station] = fields.as_slice() else {
            return Err(IoError::MalformedLocation {
                line: line_no,
                reason: format!("expected 3 fields, found {}", fields.len()),
            });
        };
        if let Some(&first_line) = seen.get(station) {
            return Err(IoError::DuplicateStation {
                station: (*station).to_owned(),
                line: line_no,
                first_line,
            });
        }
        seen.insert(*station, line_no);
        longitudes.push(Scalar::Float64(parse_coordinate(lon, "longitude", line_no)?));
        latitudes.push(Scalar::Float64(parse_coordinate(lat, "latitude", line_no)?));
        stations.push(Scalar::Utf8((*station).to_owned()));
    }

    let mut columns = BTreeMap::new();
    columns.insert(names.longitude.clone(), Column::new(DType::Float64, longitudes)?);
    columns.insert(names.latitude.clone(), Column::new(DType::Float64, latitudes)?);
    columns.insert(names.station.clone(), Column::new(DType::Utf8, stations)?);
    Ok(Table::new(columns)?)
}

pub fn read_locations_path(path: &Path, names: &LocationColumns) -> Result<Table, IoError> {
    read_locations_str(&fs::read_to_string(path)?, names)
}

fn parse_coordinate(field: &str, what: &str, line: usize) -> Result<f64, IoError> {
    match field.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(IoError::MalformedLocation {
            line,
            reason: format!("{what} {field:?} is not a finite number"),
        }),
    }
}

pub fn read_parquet_path(path: &Path, options: &ReadOptions) -> Result<Table, IoError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let mut targets = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let force = options.forces_string(field.name());
        targets.push((field.name().clone(), arrow_target(field.name(), field.data_type(), force)?));
    }

    let mut values = targets.iter().map(|_| Vec::new()).collect::<Vec<_>>();
    for batch in reader {
        let batch = batch?;
        for ((array, (_, (arrow_type, _))), out) in
            batch.columns().iter().zip(&targets).zip(values.iter_mut())
        {
            out.extend(arrow_to_scalars(array, arrow_type)?);
        }
    }

    let mut columns = BTreeMap::new();
    for ((name, (_, dtype)), cells) in targets.into_iter().zip(values) {
        columns.insert(name, Column::new(dtype, cells)?);
    }
    Ok(Table::new(columns)?)
}

fn arrow_target(
    column: &str,
    data_type: &DataType,
    force_string: bool,
) -> Result<(DataType, DType), IoError> {
    if force_string {
        return Ok((DataType::Utf8, DType::Utf8));
    }
    let target = match data_type {
        DataType::Null => (DataType::Null, DType::Null),
        DataType::Boolean => (DataType::Boolean, DType::Bool),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => (DataType::Int64, DType::Int64),
        DataType::UInt64
        | DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _) => (DataType::Float64, DType::Float64),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Dictionary(_, _) => {
            (DataType::Utf8, DType::Utf8)
        }
        other => {
            return Err(IoError::UnsupportedArrowType {
                column: column.to_owned(),
                data_type: other.to_string(),
            });
        }
    };
    Ok(target)
}

fn arrow_to_scalars(array: &ArrayRef, target: &DataType) -> Result<Vec<Scalar>, IoError> {
    let converted = cast(array, target)?;
    let missing = Scalar::Null(NullKind::Null);
    let out = match target {
        DataType::Boolean => converted
            .as_boolean()
            .iter()
            .map(|v| v.map_or_else(|| missing.clone(), Scalar::Bool))
            .collect(),
        DataType::Int64 => converted
            .as_primitive::<Int64Type>()
            .iter()
            .map(|v| v.map_or_else(|| missing.clone(), Scalar::Int64))
            .collect(),
        DataType::Float64 => converted
            .as_primitive::<Float64Type>()
            .iter()
            .map(|v| v.map_or_else(|| missing.clone(), Scalar::Float64))
            .collect(),
        DataType::Utf8 => converted
            .as_string::<i32>()
            .iter()
            .map(|v| v.map_or_else(|| missing.clone(), |s| Scalar::Utf8(s.to_owned())))
            .collect(),
        _ => vec![missing; converted.len()],
    };
    Ok(out)
}

pub fn write_csv_string(table: &Table) -> Result<String, IoError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());

    let headers = table.column_names().collect::<Vec<_>>();
    writer.write_record(&headers)?;

    for row_idx in 0..table.len() {
        let row = headers
            .iter()
            .map(|name| {
                table
                    .column(name)
                    .and_then(|column| column.value(row_idx))
                    .map_or_else(String::new, scalar_to_csv)
            })
            .collect::<Vec<_>>();
        writer.write_record(&row)?;
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

fn parse_scalar(field: &str) -> Scalar {
    if field.is_empty() {
        return Scalar::Null(NullKind::Null);
    }

    if let Ok(value) = field.parse::<i64>() {
        return Scalar::Int64(value);
    }
    if let Ok(value) = field.parse::<f64>() {
        return Scalar::Float64(value);
    }
    match field {
        "True" | "true" => return Scalar::Bool(true),
        "False" | "false" => return Scalar::Bool(false),
        _ => {}
    }

    Scalar::Utf8(field.to_owned())
}

fn scalar_to_csv(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Null(_) => String::new(),
        Scalar::Bool(v) => v.to_string(),
        Scalar::Int64(v) => v.to_string(),
        Scalar::Float64(v) => {
            if v.is_nan() {
                String::new()
            } else {
                v.to_string()
            }
        }
        Scalar::Utf8(v) => v.clone(),
    }
}
