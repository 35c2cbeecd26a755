#![no_main]

use gm_frame::Table;
use gm_schema::SchemaRegistry;
use gm_types::DType;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let probe = Table::empty_with_schema([
        ("station", DType::Utf8),
        ("imt", DType::Utf8),
        ("rotd50", DType::Float64),
        ("rotd100", DType::Float64),
        ("size", DType::Int64),
        ("flag", DType::Bool),
    ]);
    let schema = SchemaRegistry::from_table(&probe, ["imt"]);
    let _ = gm_expr::validate(input, &schema);
});
