use std::fmt::Write as _;

use gm_expr::ErrorKind;
use gm_viz::escape_html;

use crate::RenderPage;

/// Inline feedback for a rejected query.
#[must_use]
pub fn error_fragment(kind: ErrorKind, message: &str) -> String {
    format!(
        "<div class=\"query-error\" data-kind=\"{}\">{}</div>",
        kind.name(),
        escape_html(message)
    )
}

pub(crate) fn render_page(page: &RenderPage) -> String {
    let mut html = String::new();
    html.push_str("<form id=\"controls\" method=\"get\" action=\"/\">\n");
    html.push_str("  <select name=\"intensity_measure\">\n");
    let mut measures = page.measures.iter().map(String::as_str).collect::<Vec<_>>();
    // An unknown selection still round-trips through the form.
    if !measures.contains(&page.selected_measure.as_str()) {
        measures.push(&page.selected_measure);
    }
    for measure in measures {
        let selected = if measure == page.selected_measure {
            " selected"
        } else {
            ""
        };
        let escaped = escape_html(measure);
        let _ = writeln!(
            html,
            "    <option value=\"{escaped}\"{selected}>{escaped}</option>"
        );
    }
    html.push_str("  </select>\n");
    let _ = writeln!(
        html,
        "  <input type=\"text\" name=\"query\" value=\"{}\" hx-get=\"/validate\" \
         hx-trigger=\"keyup changed delay:300ms\" hx-target=\"#query-feedback\">",
        escape_html(&page.query)
    );
    html.push_str("  <button type=\"submit\">Render</button>\n</form>\n");

    html.push_str("<div id=\"query-feedback\">");
    if let Some(err) = &page.filter_error {
        html.push_str(&error_fragment(err.kind, &err.message));
    }
    html.push_str("</div>\n");

    let _ = writeln!(
        html,
        "<p class=\"row-count\">{} {}</p>",
        page.row_count,
        if page.row_count == 1 { "row" } else { "rows" }
    );
    if let Some(message) = &page.figure_error {
        let _ = writeln!(
            html,
            "<div class=\"figure-error\">{}</div>",
            escape_html(message)
        );
    }
    html.push_str(page.figure.as_str());
    html
}
