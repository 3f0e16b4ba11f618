//! Tab-separated classifier output reading

use std::collections::HashMap;
use tracing::warn;

/// Headed TSV text as column-name keyed rows
///
/// Malformed rows are skipped with a warning. Empty or header-only text
/// yields no rows.
pub fn read_rows(raw: &str) -> (Vec<String>, Vec<HashMap<String, String>>) {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());

    let headers: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(str::to_string).collect(),
        Err(e) => {
            warn!(error = %e, "Unreadable TSV header");
            return (Vec::new(), Vec::new());
        }
    };

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        match record {
            Ok(record) => {
                let row = headers
                    .iter()
                    .cloned()
                    .zip(record.iter().map(str::to_string))
                    .collect();
                rows.push(row);
            }
            Err(e) => warn!(line = line + 2, error = %e, "Skipping malformed TSV row"),
        }
    }
    (headers, rows)
}

/// Headerless TSV text split into trimmed fields per non-blank line
pub fn split_lines(raw: &str) -> Vec<Vec<&str>> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split('\t').map(str::trim).collect())
        .collect()
}

/// Genus names that carry no information
pub fn is_blank_genus(genus: &str) -> bool {
    let genus = genus.trim();
    genus.is_empty() || genus.eq_ignore_ascii_case("nan")
}
