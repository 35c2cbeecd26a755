#![forbid(unsafe_code)]

//! Ground-motion data exploration backend.
//!
//! A measurement table joined with station locations is served through two
//! handlers: [`render`] narrows it by intensity measure and a restricted
//! pandas-style filter expression and draws the result, and [`validate`]
//! checks an expression against the schema alone so a client can give
//! feedback on every keystroke.
//!
//! ```no_run
//! use gmview::{AppConfig, AppState, RenderParams, render};
//!
//! let state = AppState::open(AppConfig::from_instance_dir("instance"))?;
//! let page = render(
//!     &state,
//!     RenderParams {
//!         intensity_measure: Some("PGA".into()),
//!         query: Some("rotd100 / rotd50 > 1.3".into()),
//!     },
//! );
//! println!("{}", page.to_html());
//! # Ok::<(), gmview::DataLoadError>(())
//! ```

pub use gm_columnar::{Column, ColumnError};
pub use gm_expr::{
    ErrorKind, EvalContext, Expr, ExprError, FilterError, Function, ValidationResult, apply,
    apply_with_limits, eval_str, parse_expr, parse_expr_with_limits, query_str,
    validate as validate_expression, validate_with_limits,
};
pub use gm_frame::{FrameError, Series, Table};
pub use gm_io::{IoError, read_table_path, write_csv_string};
pub use gm_join::{JoinError, join_on_key};
pub use gm_runtime::{AppConfig, ColumnConfig, ConfigError, EvalLimits, MapConfig};
pub use gm_schema::{ColumnType, SchemaRegistry};
pub use gm_store::{DataLoadError, DatasetStore};
pub use gm_types::{DType, Scalar, TypeError};
pub use gm_viz::{
    Fragment, GeoPoint, MapFigureVisualizer, RenderOptions, VizError, Visualizer, centroid,
};
pub use gm_web::{
    AppState, FilteredView, RenderPage, RenderParams, ValidateParams, ValidateResponse,
    error_fragment, filtered_view, render, validate,
};
