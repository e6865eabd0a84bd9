//! Purpose: Render a table snapshot into the HTML view served by `gridfile serve`.
//! Exports: `render_table_page`.
//! Role: Small, pure string builder; the serve layer hands it headers, rows,
//! and an optional error banner.
//! Invariants: Cell ids are stable: `th#<header>`, `tr#<n>`, `td#<header><n>`
//! with 1-based row numbers.
//! Invariants: All user-supplied text is HTML-escaped.

use crate::core::table::Row;

pub fn render_table_page(
    title: &str,
    headers: &[String],
    rows: &[Row],
    error: Option<&str>,
) -> String {
    let mut out = String::new();
    out.push_str("<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str("<title>");
    push_escaped(title, &mut out);
    out.push_str("</title>\n");
    out.push_str(
        "<style>\ntable { border-collapse: collapse; }\nth, td { border: 1px solid #888; padding: 4px 8px; }\n.error { color: #a00; }\n</style>\n",
    );
    out.push_str("</head>\n<body>\n<h1>");
    push_escaped(title, &mut out);
    out.push_str("</h1>\n");

    if let Some(error) = error {
        out.push_str("<p class=\"error\" id=\"error\">");
        push_escaped(error, &mut out);
        out.push_str("</p>\n");
    }

    push_filter_form(headers, &mut out);

    out.push_str("<table>\n<thead>\n<tr>\n");
    for header in headers {
        out.push_str("<th id=\"");
        push_escaped(header, &mut out);
        out.push_str("\">");
        push_escaped(header, &mut out);
        out.push_str("</th>\n");
    }
    out.push_str("</tr>\n</thead>\n<tbody>\n");

    for (index, row) in rows.iter().enumerate() {
        let row_number = index + 1;
        out.push_str(&format!("<tr id=\"{row_number}\">\n"));
        for header in headers {
            out.push_str("<td id=\"");
            push_escaped(header, &mut out);
            out.push_str(&row_number.to_string());
            out.push_str("\">");
            push_escaped(row.get(header).unwrap_or_default(), &mut out);
            out.push_str("</td>\n");
        }
        out.push_str("</tr>\n");
    }

    out.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    out
}

fn push_filter_form(headers: &[String], out: &mut String) {
    if headers.is_empty() {
        return;
    }
    out.push_str("<form method=\"get\">\n");
    for header in headers {
        out.push_str("<label>");
        push_escaped(header, out);
        out.push_str(" <input type=\"text\" name=\"");
        push_escaped(header, out);
        out.push_str("\"></label>\n");
    }
    out.push_str("<button type=\"submit\">Filter</button>\n</form>\n");
}

fn push_escaped(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::render_table_page;
    use crate::core::table::Row;

    fn headers() -> Vec<String> {
        vec!["name".to_string(), "street".to_string()]
    }

    #[test]
    fn cells_carry_stable_ids() {
        let rows = vec![
            Row::from_pairs([("name", "otto"), ("street", "Landstr")]),
            Row::from_pairs([("name", "maier"), ("street", "Hauptstr")]),
        ];
        let page = render_table_page("people", &headers(), &rows, None);
        assert!(page.contains("<th id=\"name\">name</th>"));
        assert!(page.contains("<th id=\"street\">street</th>"));
        assert!(page.contains("<tr id=\"1\">"));
        assert!(page.contains("<td id=\"name1\">otto</td>"));
        assert!(page.contains("<td id=\"street2\">Hauptstr</td>"));
    }

    #[test]
    fn error_banner_is_rendered_only_when_present() {
        let page = render_table_page("people", &headers(), &[], Some("No entries found."));
        assert!(page.contains("id=\"error\""));
        assert!(page.contains("No entries found."));

        let clean = render_table_page("people", &headers(), &[], None);
        assert!(!clean.contains("id=\"error\""));
    }

    #[test]
    fn values_are_html_escaped() {
        let rows = vec![Row::from_pairs([
            ("name", "<script>"),
            ("street", "a&b"),
        ])];
        let page = render_table_page("people", &headers(), &rows, None);
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("a&amp;b"));
        assert!(!page.contains("<script>"));
    }
}
