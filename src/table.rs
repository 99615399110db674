//! Aligned plain-text tables for terminal output.

use std::fmt::Write as _;

use crate::planner::ColumnPlan;

const PLAN_HEADERS: [&str; 3] = ["column", "type", "source"];

pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|h| h.chars().count())
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(single_line(cell).chars().count());
        }
    }

    let mut output = String::new();
    let header_cells = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&header_cells, &widths));
    let rule = widths.iter().map(|w| "-".repeat((*w).max(3))).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn render_plan(plan: &ColumnPlan) -> String {
    render_table(&PLAN_HEADERS, &plan.describe())
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| format!("{:<width$}", single_line(value), width = *width))
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn single_line(value: &str) -> String {
    value.replace(['\n', '\r', '\t'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_are_padded_to_the_widest_cell() {
        let rendered = render_table(
            &["column", "type"],
            &[
                vec!["name".to_string(), "text".to_string()],
                vec!["loaded_at".to_string(), "timestamp".to_string()],
            ],
        );
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "column     type");
        assert_eq!(lines[1], "---------  ---------");
        assert_eq!(lines[2], "name       text");
        assert_eq!(lines[3], "loaded_at  timestamp");
    }

    #[test]
    fn embedded_whitespace_is_flattened() {
        let rendered = render_table(&["v"], &[vec!["a\tb".to_string()]]);
        assert!(rendered.ends_with("a b\n"));
    }
}
