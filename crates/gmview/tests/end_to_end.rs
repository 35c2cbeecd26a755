use std::fs;
use std::path::Path;

use gmview::{
    AppConfig, AppState, ErrorKind, RenderParams, ValidateParams, apply, render, validate,
};

const READINGS: &str = "\
,station,imt,H1,H2,rotd50,rotd100,size
0,A,PGA,0.9,1.1,1.0,1.2,8
1,B,PGA,1.9,2.1,2.0,2.4,8
2,C,PGA,2.9,3.1,3.0,3.6,8
3,X,PGA,0.9,1.1,1.0,1.5,8
4,A,PGV,9.0,11.0,10.0,12.0,8
5,Q,PGA,5.0,5.0,5.0,9.0,8
";

const LOCATIONS: &str = "\
# longitude latitude station
-118.25 34.05 A
-117.16 32.72 B
-121.89 37.34 C
-119.70 34.42 X
";

fn state(dir: &Path) -> AppState {
    fs::write(dir.join("dataset.csv"), READINGS).expect("write readings");
    fs::write(dir.join("locations.txt"), LOCATIONS).expect("write locations");
    let config = AppConfig::from_instance_dir(dir).with_dataset_path(dir.join("dataset.csv"));
    AppState::open(config).expect("open")
}

fn stations(table: &gmview::Table) -> Vec<String> {
    table
        .column("station")
        .expect("station")
        .values()
        .iter()
        .filter_map(|cell| cell.as_str().map(str::to_owned))
        .collect()
}

#[test]
fn threshold_query_filters_stations() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state(dir.path());
    let base = state.store().snapshot();
    // Station Q has no location and never reaches the table.
    assert_eq!(base.len(), 5);

    let pga = base
        .select_eq("imt", &gmview::Scalar::from("PGA"))
        .expect("pga");
    let view = apply("rotd50 > 1.5", &pga).expect("apply");
    assert_eq!(stations(&view), ["B", "C"]);
}

#[test]
fn ratio_query_draws_exactly_one_station() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state(dir.path());
    let page = render(
        &state,
        RenderParams {
            intensity_measure: Some("PGA".into()),
            query: Some("rotd100 / rotd50 > 1.3".into()),
        },
    );
    assert_eq!(page.row_count, 1);
    assert!(page.filter_error.is_none());
    let figure = page.figure.as_str();
    assert!(figure.contains("&quot;text&quot;:[&quot;X&quot;]"), "{figure}");
    assert!((page.center.lat - 34.42).abs() < 1e-9);
    assert!((page.center.lon + 119.70).abs() < 1e-9);
}

#[test]
fn validate_scenarios() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state(dir.path());
    let check = |query: Option<&str>| {
        validate(
            &state,
            ValidateParams {
                query: query.map(str::to_owned),
            },
        )
    };

    let syntax = check(Some("rotd50 >>"));
    assert_eq!(syntax.result.kind(), Some(ErrorKind::Syntax));
    assert!(!syntax.body.is_empty());

    let unknown = check(Some("nonexistent_col > 1"));
    assert_eq!(unknown.result.kind(), Some(ErrorKind::UnknownColumn));
    assert!(!unknown.body.is_empty());

    assert!(check(Some("")).body.is_empty());
    assert!(check(None).body.is_empty());
    assert!(check(Some("H1 < H2 and imt in ['PGA', 'PGV']")).body.is_empty());
}

#[test]
fn hostile_queries_never_reach_the_data() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state(dir.path());
    for query in [
        "__import__('os').system('ls')",
        "station.__class__",
        "@secret > 1",
        "rotd50[0] > 1",
        "exec('1')",
    ] {
        let response = validate(
            &state,
            ValidateParams {
                query: Some(query.to_owned()),
            },
        );
        assert_eq!(response.result.kind(), Some(ErrorKind::Disallowed), "{query}");

        let page = render(
            &state,
            RenderParams {
                intensity_measure: None,
                query: Some(query.to_owned()),
            },
        );
        assert_eq!(page.row_count, 4, "{query}");
        assert_eq!(
            page.filter_error.map(|err| err.kind),
            Some(ErrorKind::Disallowed)
        );
    }
}

#[test]
fn render_html_is_bookmarkable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state(dir.path());
    let html = render(
        &state,
        RenderParams {
            intensity_measure: Some("PGV".into()),
            query: Some("rotd50 >= 10".into()),
        },
    )
    .to_html();
    assert!(html.contains("<option value=\"PGV\" selected>PGV</option>"));
    assert!(html.contains("name=\"query\" value=\"rotd50 &gt;= 10\""));
    assert!(html.contains("1 row"));
}
