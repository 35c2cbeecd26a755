#![no_main]

use gm_frame::Table;
use gm_schema::SchemaRegistry;
use gm_types::Scalar;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(table) = Table::from_dict(
        &["station", "imt", "rotd50", "size"],
        vec![
            ("station", vec!["A".into(), "B".into(), Scalar::Null(gm_types::NullKind::Null)]),
            ("imt", vec!["PGA".into(), "PGV".into(), "PGA".into()]),
            ("rotd50", vec![1.0.into(), Scalar::Float64(f64::NAN), (-3.5).into()]),
            ("size", vec![Scalar::Int64(0), Scalar::Int64(7), Scalar::Int64(i64::MAX)]),
        ],
    ) else {
        return;
    };
    let schema = SchemaRegistry::from_table(&table, ["imt"]);
    let verdict = gm_expr::validate(input, &schema);
    match gm_expr::apply(input, &table) {
        Ok(view) => {
            assert!(verdict.is_valid(), "{input}: {verdict:?}");
            assert!(view.len() <= table.len());
        }
        Err(err) => {
            if let Some(kind) = verdict.kind() {
                assert_eq!(kind, err.kind, "{input}");
            }
        }
    }
});
