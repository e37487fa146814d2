use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::ReaderBuilder;

use super::{AnalysisError, TabularAnalyzer};

/// Summarizes CSV/TSV files: shape plus descriptive statistics of numeric columns.
pub struct CsvAnalyzer;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSummary {
    pub rows: usize,
    pub columns: usize,
    pub numeric: Vec<ColumnStats>,
}

#[async_trait::async_trait]
impl TabularAnalyzer for CsvAnalyzer {
    #[tracing::instrument(name = "analysis.tabular", skip(self))]
    async fn analyze_tabular(&self, path: &Path) -> Result<String, AnalysisError> {
        let owned = path.to_path_buf();
        let summary = tokio::task::spawn_blocking(move || summarize_file(&owned))
            .await
            .map_err(|e| AnalysisError::Task(e.to_string()))??;

        tracing::debug!(
            rows = summary.rows,
            columns = summary.columns,
            numeric_columns = summary.numeric.len(),
            "tabular artifact summarized"
        );

        Ok(summary.to_string())
    }
}

pub fn summarize_file(path: &Path) -> Result<TableSummary, AnalysisError> {
    let file = File::open(path).map_err(|e| AnalysisError::unreadable(path, e))?;

    let is_tsv = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("tsv"))
        .unwrap_or(false);
    let delimiter = if is_tsv { b'\t' } else { b',' };

    summarize_reader(BufReader::new(file), delimiter)
        .map_err(|reason| AnalysisError::unreadable(path, reason))
}

pub fn summarize_reader<R: Read>(reader: R, delimiter: u8) -> Result<TableSummary, String> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(reader);

    let headers = rdr.headers().map_err(|e| e.to_string())?.clone();
    if headers.is_empty() {
        return Err("no columns found".to_string());
    }

    // None once a column has shown a non-numeric cell.
    let mut columns: Vec<Option<Vec<f64>>> = vec![Some(Vec::new()); headers.len()];
    let mut rows = 0usize;

    for result in rdr.records() {
        let record = result.map_err(|e| e.to_string())?;
        rows += 1;

        for (column, cell) in columns.iter_mut().zip(record.iter()) {
            let Some(values) = column else { continue };
            let cell = cell.trim();
            if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
                continue;
            }
            match cell.parse::<f64>() {
                Ok(value) if value.is_finite() => values.push(value),
                _ => *column = None,
            }
        }
    }

    let numeric = headers
        .iter()
        .zip(columns)
        .filter_map(|(name, values)| {
            let values = values?;
            describe(name, values)
        })
        .collect();

    Ok(TableSummary {
        rows,
        columns: headers.len(),
        numeric,
    })
}

fn describe(name: &str, mut values: Vec<f64>) -> Option<ColumnStats> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    let std = if count > 1 {
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    } else {
        f64::NAN
    };

    Some(ColumnStats {
        name: name.to_string(),
        count,
        mean,
        std,
        min: values[0],
        q25: quantile(&values, 0.25),
        median: quantile(&values, 0.5),
        q75: quantile(&values, 0.75),
        max: values[count - 1],
    })
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

impl fmt::Display for TableSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rows: {}, Columns: {}", self.rows, self.columns)?;
        if self.numeric.is_empty() {
            return Ok(());
        }

        write!(f, "\nNumeric statistics:")?;

        let stat_rows: [(&str, fn(&ColumnStats) -> f64); 8] = [
            ("count", |c| c.count as f64),
            ("mean", |c| c.mean),
            ("std", |c| c.std),
            ("min", |c| c.min),
            ("25%", |c| c.q25),
            ("50%", |c| c.median),
            ("75%", |c| c.q75),
            ("max", |c| c.max),
        ];

        let cells: Vec<Vec<String>> = stat_rows
            .iter()
            .map(|(_, stat)| {
                self.numeric
                    .iter()
                    .map(|column| format!("{:.2}", stat(column)))
                    .collect()
            })
            .collect();

        let widths: Vec<usize> = self
            .numeric
            .iter()
            .enumerate()
            .map(|(i, column)| {
                cells
                    .iter()
                    .map(|row| row[i].len())
                    .chain(std::iter::once(column.name.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        write!(f, "\n{:<5}", "")?;
        for (column, width) in self.numeric.iter().zip(&widths) {
            write!(f, "  {:>width$}", column.name, width = *width)?;
        }
        for ((label, _), row) in stat_rows.iter().zip(&cells) {
            write!(f, "\n{label:<5}")?;
            for (cell, width) in row.iter().zip(&widths) {
                write!(f, "  {:>width$}", cell, width = *width)?;
            }
        }

        Ok(())
    }
}
