#![no_main]

use gm_runtime::EvalLimits;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let limits = EvalLimits::default();
    if let Ok(expr) = gm_expr::parse_expr_with_limits(input, &limits) {
        assert!(expr.depth() <= limits.max_depth, "{input}");
        assert!(input.chars().count() <= limits.max_expression_len);
    }
});
