#![forbid(unsafe_code)]

//! Request handlers.
//!
//! Routing is left to the embedding server: [`render`] backs `GET /` and
//! [`validate`] backs `GET /validate`. Both take their parameters as plain
//! deserializable structs so any router can extract them from a query
//! string, and both always answer with something the page can show.

mod page;

use std::sync::{Arc, Mutex, RwLock};

use gm_expr::{ErrorKind, FilterError, ValidationResult, apply_with_limits, validate_with_limits};
use gm_frame::Table;
use gm_runtime::AppConfig;
use gm_schema::SchemaRegistry;
use gm_store::{DataLoadError, DatasetStore};
use gm_types::Scalar;
use gm_viz::{Fragment, GeoPoint, MapFigureVisualizer, RenderOptions, Visualizer, centroid};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use page::error_fragment;

/// Shared, read-mostly state behind every request.
pub struct AppState {
    config: AppConfig,
    store: DatasetStore,
    schema: RwLock<Arc<SchemaRegistry>>,
    /// Held across a store reload and the schema swap that follows it.
    reload_lock: Mutex<()>,
    visualizer: Box<dyn Visualizer>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Load the configured dataset and render with [`MapFigureVisualizer`].
    pub fn open(config: AppConfig) -> Result<Self, DataLoadError> {
        let store = DatasetStore::open(&config)?;
        Ok(Self::new(config, store, Box::new(MapFigureVisualizer::new())))
    }

    #[must_use]
    pub fn new(config: AppConfig, store: DatasetStore, visualizer: Box<dyn Visualizer>) -> Self {
        let schema = build_schema(&config, &store.snapshot());
        Self {
            config,
            store,
            schema: RwLock::new(Arc::new(schema)),
            reload_lock: Mutex::new(()),
            visualizer,
        }
    }

    #[must_use]
    pub fn with_visualizer(mut self, visualizer: Box<dyn Visualizer>) -> Self {
        self.visualizer = visualizer;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    #[must_use]
    pub fn schema(&self) -> Arc<SchemaRegistry> {
        let guard = self
            .schema
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Reload the dataset and refresh the categories the schema reports.
    /// Column names and dtypes cannot change across a reload.
    pub fn reload(&self) -> Result<Arc<Table>, DataLoadError> {
        let _reloading = self
            .reload_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let table = self.store.reload()?;
        let schema = Arc::new(build_schema(&self.config, &table));
        {
            let mut guard = self
                .schema
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = schema;
        }
        info!(rows = table.len(), "application state reloaded");
        Ok(table)
    }

    fn render_options(&self, center: GeoPoint) -> RenderOptions {
        let columns = &self.config.columns;
        RenderOptions {
            center,
            zoom: self.config.map.zoom,
            latitude_column: columns.latitude.clone(),
            longitude_column: columns.longitude.clone(),
            hover_column: columns.station.clone(),
            size_column: columns.marker_size.clone(),
            default_marker_size: self.config.map.default_marker_size,
        }
    }
}

fn build_schema(config: &AppConfig, table: &Table) -> SchemaRegistry {
    SchemaRegistry::from_table(table, config.effective_categorical_columns())
}

/// Parameters of `GET /`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderParams {
    pub intensity_measure: Option<String>,
    pub query: Option<String>,
}

/// Parameters of `GET /validate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateParams {
    pub query: Option<String>,
}

/// The rows a render shows, before any drawing.
#[derive(Debug, Clone)]
pub struct FilteredView {
    pub table: Table,
    pub selected_measure: String,
    pub query: String,
    /// Set when the query was rejected; `table` then holds the
    /// measure-only selection.
    pub filter_error: Option<FilterError>,
}

/// Select the measure and apply the query.
///
/// A bad query never fails the request: the view falls back to the
/// measure-only selection and carries the classified error.
pub fn filtered_view(state: &AppState, params: &RenderParams) -> FilteredView {
    let selected_measure = params
        .intensity_measure
        .as_deref()
        .map(str::trim)
        .filter(|measure| !measure.is_empty())
        .unwrap_or(&state.config.default_measure)
        .to_owned();
    let query = params.query.clone().unwrap_or_default();

    let base = state.store.snapshot();
    let by_measure = match base.select_eq(
        &state.config.columns.measure,
        &Scalar::from(selected_measure.as_str()),
    ) {
        Ok(view) => view,
        Err(err) => {
            warn!(measure = %selected_measure, error = %err, "measure selection failed");
            return FilteredView {
                table: Table::empty_with_schema(
                    base.schema().iter().map(|(name, dtype)| (name.as_str(), *dtype)),
                ),
                selected_measure,
                query,
                filter_error: Some(FilterError {
                    kind: ErrorKind::Other,
                    message: err.to_string(),
                }),
            };
        }
    };

    if query.trim().is_empty() {
        return FilteredView {
            table: by_measure,
            selected_measure,
            query,
            filter_error: None,
        };
    }

    match apply_with_limits(&query, &by_measure, &state.config.limits) {
        Ok(table) => FilteredView {
            table,
            selected_measure,
            query,
            filter_error: None,
        },
        Err(err) => {
            debug!(kind = %err.kind, "filter rejected; showing measure-only view");
            FilteredView {
                table: by_measure,
                selected_measure,
                query,
                filter_error: Some(err),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPage {
    pub figure: Fragment,
    /// Every measure the dataset offers, for the selector.
    pub measures: Vec<String>,
    pub selected_measure: String,
    pub query: String,
    pub filter_error: Option<FilterError>,
    /// Set when the visualizer failed; `figure` is then empty.
    pub figure_error: Option<String>,
    pub row_count: usize,
    pub center: GeoPoint,
}

impl RenderPage {
    /// The page body: the control form, inline feedback, and the figure.
    #[must_use]
    pub fn to_html(&self) -> String {
        page::render_page(self)
    }
}

/// Handler for `GET /`.
pub fn render(state: &AppState, params: RenderParams) -> RenderPage {
    let view = filtered_view(state, &params);
    let columns = &state.config.columns;
    let center = centroid(&view.table, &columns.latitude, &columns.longitude)
        .or_else(|| {
            let base = state.store.snapshot();
            centroid(&base, &columns.latitude, &columns.longitude)
        })
        .unwrap_or(GeoPoint::ORIGIN);

    let (figure, figure_error) = match state
        .visualizer
        .render(&view.table, &state.render_options(center))
    {
        Ok(figure) => (figure, None),
        Err(err) => {
            warn!(error = %err, "visualization failed");
            (Fragment::empty(), Some(err.to_string()))
        }
    };

    let measures = state
        .schema()
        .categories(&columns.measure)
        .map(<[String]>::to_vec)
        .unwrap_or_default();

    debug!(
        measure = %view.selected_measure,
        rows = view.table.len(),
        filtered = view.filter_error.is_none() && !view.query.trim().is_empty(),
        "render"
    );
    RenderPage {
        figure,
        measures,
        selected_measure: view.selected_measure,
        query: view.query,
        filter_error: view.filter_error,
        figure_error,
        row_count: view.table.len(),
        center,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidateResponse {
    pub result: ValidationResult,
    /// Empty when the query is valid or absent.
    pub body: String,
}

/// Handler for `GET /validate`. Reads only the schema registry.
pub fn validate(state: &AppState, params: ValidateParams) -> ValidateResponse {
    let query = params.query.unwrap_or_default();
    let result = validate_with_limits(&query, &state.schema(), &state.config.limits);
    let body = match &result {
        ValidationResult::Valid => String::new(),
        ValidationResult::Invalid { kind, message } => error_fragment(*kind, message),
    };
    ValidateResponse { result, body }
}
