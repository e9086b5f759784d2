//! Terminal output helpers

use crate::data::{RowSet, cell_to_string};

/// Format a URL as a clickable terminal hyperlink if supported.
///
/// Uses OSC 8 escape sequences on terminals that understand them and falls
/// back to plain colored text elsewhere.
pub fn terminal_link(url: &str) -> String {
    if supports_hyperlinks::on(supports_hyperlinks::Stream::Stdout) {
        format!("\x1b]8;;{}\x07\x1b[36m{}\x1b[0m\x1b]8;;\x07", url, url)
    } else {
        format!("\x1b[36m{}\x1b[0m", url)
    }
}

/// Render a row set as text.
///
/// A single column prints as its name, a dash underline and one value per
/// line, which keeps multi-line values (EXPLAIN output, DDL) copyable. Wider
/// results print as a boxed table.
pub fn format_rows(rows: &RowSet) -> String {
    let cells: Vec<Vec<String>> = rows
        .rows()
        .iter()
        .map(|r| r.iter().map(cell_to_string).collect())
        .collect();

    if let [column] = rows.columns() {
        let mut out = format!("{}\n{}\n", column, "-".repeat(column.chars().count()));
        for row in &cells {
            out.push_str(row.first().map(String::as_str).unwrap_or(""));
            out.push('\n');
        }
        return out;
    }

    let mut widths: Vec<usize> = rows.columns().iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let separator = {
        let mut line = String::from("+");
        for w in &widths {
            line.push_str(&"-".repeat(w + 2));
            line.push('+');
        }
        line.push('\n');
        line
    };
    let format_line = |values: &[String]| {
        let mut line = String::from("|");
        for (i, w) in widths.iter().enumerate() {
            let value = values.get(i).map(String::as_str).unwrap_or("");
            let pad = w - value.chars().count().min(*w);
            line.push(' ');
            line.push_str(value);
            line.push_str(&" ".repeat(pad + 1));
            line.push('|');
        }
        line.push('\n');
        line
    };

    let mut out = separator.clone();
    out.push_str(&format_line(rows.columns()));
    out.push_str(&separator);
    for row in &cells {
        out.push_str(&format_line(row));
    }
    if !cells.is_empty() {
        out.push_str(&separator);
    }
    out
}
