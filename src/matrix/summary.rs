//! Text rendering of the result matrix.

use std::fmt::Write;

use super::{Outcome, ResultMatrix, WordSize};

const UNITS: [&str; 6] = ["B", "K", "M", "G", "T", "P"];

/// Rows in display order, after the "Total testcases" row.
const ROWS: [Outcome; 9] = [
    Outcome::Skipped,
    Outcome::Pass,
    Outcome::Fail,
    Outcome::Signal,
    Outcome::ConfigError,
    Outcome::ExpectedFail,
    Outcome::UnexpectedPass,
    Outcome::Strange,
    Outcome::Interrupted,
];

/// Express a byte count in the largest unit that keeps it at or below 1024.
pub fn pretty_page_size(bytes: u64) -> String {
    let mut size = bytes;
    let mut factor = 0;
    while size > 1024 && factor < UNITS.len() - 1 {
        factor += 1;
        size /= 1024;
    }
    format!("{}{}", size, UNITS[factor])
}

/// Render the end-of-run summary table.
///
/// One row per outcome kind, one 32-bit/64-bit column pair per page size.
pub fn render_summary(matrix: &ResultMatrix) -> String {
    let mut out = String::new();
    let pages = matrix.page_sizes();

    let _ = writeln!(out, "********** TEST SUMMARY");
    let _ = write!(out, "*{:22}", "");
    for page in pages {
        let _ = write!(out, "{:<14}", page.to_string());
    }
    let _ = writeln!(out);
    let _ = write!(out, "*{:22}", "");
    for _ in pages {
        let _ = write!(out, "32-bit 64-bit ");
    }
    let _ = writeln!(out);

    write_row(&mut out, "Total testcases", pages.len(), |word, i| {
        matrix.total(pages[i], word)
    });
    for outcome in ROWS {
        write_row(&mut out, outcome.title(), pages.len(), |word, i| {
            matrix.count(outcome, pages[i], word)
        });
    }

    out.push_str("**********\n");
    out
}

fn write_row<F>(out: &mut String, title: &str, columns: usize, value: F)
where
    F: Fn(WordSize, usize) -> u64,
{
    let _ = write!(out, "*{:>20}: ", title);
    for i in 0..columns {
        let _ = write!(out, "{:>6} {:>6} ", value(WordSize::W32, i), value(WordSize::W64, i));
    }
    let _ = writeln!(out);
}
