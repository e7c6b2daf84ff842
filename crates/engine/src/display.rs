//! ASCII table rendering for `show`.

use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};

use crate::error::Result;

/// Cells longer than this are cut when truncating
const TRUNCATE_WIDTH: usize = 20;
const MIN_COLUMN_WIDTH: usize = 3;

/// Render `batch` as a boxed table.
///
/// Truncated tables right-align cells, full tables left-align them.
/// `has_more` appends the "only showing top N rows" footer.
pub fn render_table(batch: &RecordBatch, has_more: bool, truncate: bool) -> Result<String> {
    let options = FormatOptions::default().with_null("null");
    let schema = batch.schema();

    let header: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();

    let formatters = batch
        .columns()
        .iter()
        .map(|col| ArrayFormatter::try_new(col.as_ref(), &options))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let rows: Vec<Vec<String>> = (0..batch.num_rows())
        .map(|row| {
            formatters
                .iter()
                .map(|f| {
                    let cell = f.value(row).to_string();
                    if truncate {
                        cut(&cell)
                    } else {
                        cell
                    }
                })
                .collect()
        })
        .collect();

    let widths: Vec<usize> = header
        .iter()
        .enumerate()
        .map(|(col, name)| {
            rows.iter()
                .map(|r| r[col].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
                .max(MIN_COLUMN_WIDTH)
        })
        .collect();

    let separator: String = widths.iter().fold(String::from("+"), |mut acc, w| {
        acc.push_str(&"-".repeat(*w));
        acc.push('+');
        acc
    });

    let mut out = String::new();
    out.push_str(&separator);
    out.push('\n');
    push_row(&mut out, &header, &widths, truncate);
    out.push_str(&separator);
    out.push('\n');
    for row in &rows {
        push_row(&mut out, row, &widths, truncate);
    }
    out.push_str(&separator);
    out.push('\n');

    if has_more {
        let n = batch.num_rows();
        out.push_str(&format!(
            "only showing top {} {}\n",
            n,
            if n == 1 { "row" } else { "rows" }
        ));
    }

    Ok(out)
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize], right_align: bool) {
    out.push('|');
    for (cell, width) in cells.iter().zip(widths) {
        let pad = " ".repeat(width - cell.chars().count());
        if right_align {
            out.push_str(&pad);
            out.push_str(cell);
        } else {
            out.push_str(cell);
            out.push_str(&pad);
        }
        out.push('|');
    }
    out.push('\n');
}

fn cut(cell: &str) -> String {
    if cell.chars().count() <= TRUNCATE_WIDTH {
        return cell.to_string();
    }
    let mut short: String = cell.chars().take(TRUNCATE_WIDTH - 3).collect();
    short.push_str("...");
    short
}
