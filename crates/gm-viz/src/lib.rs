#![forbid(unsafe_code)]

//! Turning a filtered view into something a page can embed.
//!
//! The plotting renderer is a black box behind [`Visualizer`]. The default
//! [`MapFigureVisualizer`] emits a scatter-map figure description as JSON
//! inside a `<div data-figure='…'>` element for a client-side plotting
//! library to pick up.

use gm_columnar::Column;
use gm_frame::Table;
use gm_types::{DType, Scalar};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VizError {
    #[error("cannot plot: column '{0}' does not exist")]
    MissingColumn(String),
    #[error("cannot plot: column '{column}' has non-numeric dtype {dtype}")]
    NonNumeric { column: String, dtype: DType },
    #[error("cannot encode figure: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const ORIGIN: Self = Self { lat: 0.0, lon: 0.0 };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub center: GeoPoint,
    pub zoom: f64,
    pub latitude_column: String,
    pub longitude_column: String,
    /// Text shown when hovering a marker.
    pub hover_column: String,
    /// Per-marker size. When the view lacks it every marker gets
    /// `default_marker_size`.
    pub size_column: String,
    pub default_marker_size: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            center: GeoPoint::ORIGIN,
            zoom: 5.0,
            latitude_column: "lat".to_owned(),
            longitude_column: "lon".to_owned(),
            hover_column: "station".to_owned(),
            size_column: "size".to_owned(),
            default_marker_size: 8.0,
        }
    }
}

/// An HTML fragment ready to splice into a page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fragment(String);

impl Fragment {
    #[must_use]
    pub fn new(html: impl Into<String>) -> Self {
        Self(html.into())
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Fragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait Visualizer: Send + Sync {
    fn render(&self, view: &Table, options: &RenderOptions) -> Result<Fragment, VizError>;
}

/// Mean position of the rows with both coordinates present.
///
/// `None` when either column is absent or non-numeric, or no row has both
/// coordinates.
#[must_use]
pub fn centroid(table: &Table, lat: &str, lon: &str) -> Option<GeoPoint> {
    let (lat, lon) = (table.column(lat)?, table.column(lon)?);
    if !lat.dtype().is_numeric() || !lon.dtype().is_numeric() {
        return None;
    }
    let (sum_lat, sum_lon, count) = lat
        .values()
        .iter()
        .zip(lon.values())
        .filter_map(|(a, b)| Some((finite(a)?, finite(b)?)))
        .fold((0.0, 0.0, 0_usize), |(sa, so, n), (a, b)| (sa + a, so + b, n + 1));
    (count > 0).then(|| GeoPoint {
        lat: sum_lat / count as f64,
        lon: sum_lon / count as f64,
    })
}

fn finite(value: &Scalar) -> Option<f64> {
    value.to_f64().ok().filter(|v| v.is_finite())
}

/// Escape text for an HTML body or a quoted attribute value.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Scatter-map figure in the plotly JSON figure format.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapFigureVisualizer;

impl MapFigureVisualizer {
    pub const MAP_STYLE: &'static str = "open-street-map";

    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// The figure description without the HTML wrapper.
    pub fn figure(&self, view: &Table, options: &RenderOptions) -> Result<Value, VizError> {
        let lat = coordinate_column(view, &options.latitude_column)?;
        let lon = coordinate_column(view, &options.longitude_column)?;

        let hover = view
            .column(&options.hover_column)
            .map(|column| column.values().iter().map(hover_text).collect::<Vec<_>>())
            .unwrap_or_else(|| vec![Value::Null; view.len()]);

        let default_size = json_number(options.default_marker_size);
        let size = match view.column(&options.size_column) {
            Some(column) if column.dtype().is_numeric() => column
                .values()
                .iter()
                .map(|value| match finite(value) {
                    Some(v) => json_number(v),
                    None => default_size.clone(),
                })
                .collect::<Vec<_>>(),
            _ => vec![default_size; view.len()],
        };

        Ok(json!({
            "data": [{
                "type": "scattermapbox",
                "mode": "markers",
                "lat": numbers(lat),
                "lon": numbers(lon),
                "text": hover,
                "hoverinfo": "text",
                "marker": { "size": size },
            }],
            "layout": {
                "mapbox": {
                    "style": Self::MAP_STYLE,
                    "center": { "lat": options.center.lat, "lon": options.center.lon },
                    "zoom": options.zoom,
                },
                "margin": { "l": 0, "r": 0, "t": 0, "b": 0 },
                "showlegend": false,
            },
        }))
    }
}

impl Visualizer for MapFigureVisualizer {
    fn render(&self, view: &Table, options: &RenderOptions) -> Result<Fragment, VizError> {
        let figure = serde_json::to_string(&self.figure(view, options)?)?;
        Ok(Fragment::new(format!(
            "<div class=\"map-figure\" data-rows=\"{}\" data-figure='{}'></div>",
            view.len(),
            escape_html(&figure)
        )))
    }
}

fn coordinate_column<'a>(view: &'a Table, name: &str) -> Result<&'a Column, VizError> {
    let column = view
        .column(name)
        .ok_or_else(|| VizError::MissingColumn(name.to_owned()))?;
    // An all-missing column reads back as null; it plots as gaps.
    if column.dtype().is_numeric() || column.dtype() == DType::Null {
        Ok(column)
    } else {
        Err(VizError::NonNumeric {
            column: name.to_owned(),
            dtype: column.dtype(),
        })
    }
}

fn numbers(column: &Column) -> Vec<Value> {
    column
        .values()
        .iter()
        .map(|value| finite(value).map_or(Value::Null, json_number))
        .collect()
}

fn json_number(value: f64) -> Value {
    serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn hover_text(value: &Scalar) -> Value {
    if value.is_missing() {
        return Value::Null;
    }
    match value.as_str() {
        Some(text) => Value::String(text.to_owned()),
        None => Value::String(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use gm_frame::Table;
    use gm_types::Scalar;
    use serde_json::Value;

    use super::{
        GeoPoint, MapFigureVisualizer, RenderOptions, VizError, Visualizer, centroid, escape_html,
    };

    fn stations() -> Table {
        Table::from_dict(
            &["station", "lat", "lon", "size"],
            vec![
                ("station", vec!["A".into(), "B'<x>".into(), "C".into()]),
                ("lat", vec![34.0.into(), 36.0.into(), Scalar::Float64(f64::NAN)]),
                ("lon", vec![(-118.0).into(), (-116.0).into(), (-100.0).into()]),
                ("size", vec![Scalar::Int64(4), Scalar::Int64(6), Scalar::Int64(8)]),
            ],
        )
        .expect("table")
    }

    #[test]
    fn centroid_skips_rows_missing_a_coordinate() {
        let center = centroid(&stations(), "lat", "lon").expect("centroid");
        assert_eq!(center, GeoPoint { lat: 35.0, lon: -117.0 });
    }

    #[test]
    fn centroid_is_none_without_usable_rows() {
        let table = stations();
        assert_eq!(centroid(&table, "lat", "missing"), None);
        assert_eq!(centroid(&table, "station", "lon"), None);
        let empty = table.take(&[]).expect("empty");
        assert_eq!(centroid(&empty, "lat", "lon"), None);
    }

    #[test]
    fn figure_carries_points_hover_text_and_framing() {
        let options = RenderOptions {
            center: GeoPoint { lat: 35.0, lon: -117.0 },
            zoom: 6.0,
            ..RenderOptions::default()
        };
        let figure = MapFigureVisualizer::new()
            .figure(&stations(), &options)
            .expect("figure");
        let trace = &figure["data"][0];
        assert_eq!(trace["type"], "scattermapbox");
        assert_eq!(trace["lat"][2], Value::Null);
        assert_eq!(trace["lon"][0], -118.0);
        assert_eq!(trace["text"][0], "A");
        assert_eq!(trace["marker"]["size"][1], 6.0);
        assert_eq!(figure["layout"]["mapbox"]["center"]["lat"], 35.0);
        assert_eq!(figure["layout"]["mapbox"]["zoom"], 6.0);
        assert_eq!(figure["layout"]["mapbox"]["style"], "open-street-map");
    }

    #[test]
    fn missing_size_column_uses_default_marker_size() {
        let options = RenderOptions {
            size_column: "magnitude".to_owned(),
            default_marker_size: 12.0,
            ..RenderOptions::default()
        };
        let figure = MapFigureVisualizer::new()
            .figure(&stations(), &options)
            .expect("figure");
        assert_eq!(figure["data"][0]["marker"]["size"], serde_json::json!([12.0, 12.0, 12.0]));
    }

    #[test]
    fn fragment_escapes_the_embedded_figure() {
        let fragment = MapFigureVisualizer::new()
            .render(&stations(), &RenderOptions::default())
            .expect("render");
        let html = fragment.as_str();
        assert!(html.starts_with("<div class=\"map-figure\" data-rows=\"3\" data-figure='"));
        assert!(html.contains("B&#39;&lt;x&gt;"));
        assert!(!html.contains("<x>"));
    }

    #[test]
    fn missing_coordinates_are_render_errors() {
        let table = Table::from_dict(&["station"], vec![("station", vec!["A".into()])])
            .expect("table");
        let err = MapFigureVisualizer::new()
            .render(&table, &RenderOptions::default())
            .expect_err("no lat");
        assert!(matches!(err, VizError::MissingColumn(name) if name == "lat"));

        let options = RenderOptions {
            latitude_column: "station".to_owned(),
            ..RenderOptions::default()
        };
        let err = MapFigureVisualizer::new()
            .render(&stations(), &options)
            .expect_err("text lat");
        assert!(matches!(err, VizError::NonNumeric { .. }));
    }

    #[test]
    fn escaping_covers_attribute_breakouts() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }
}
