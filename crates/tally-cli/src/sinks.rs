//! Concrete report sinks.
//!
//! Two writers back every run: a plain-text grid file (one file per output
//! name, sections appended in order) and CSV (one file per section). Both
//! reinitialize on `begin`, so reruns replace prior reports instead of
//! appending to them.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use tally::{Dataset, ReportSink};

fn sink_err(e: impl std::fmt::Display) -> tally::Error {
    tally::Error::Sink(e.to_string())
}

/// Writes `<dir>/<output_name>.txt` with one grid table per section.
pub struct TextSink {
    dir: PathBuf,
    file: Option<File>,
}

impl TextSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file: None,
        }
    }
}

impl ReportSink for TextSink {
    fn begin(&mut self, output_name: &str) -> tally::Result<()> {
        fs::create_dir_all(&self.dir).map_err(sink_err)?;
        let path = self.dir.join(format!("{output_name}.txt"));
        // File::create truncates: prior state for this output name is gone.
        self.file = Some(File::create(path).map_err(sink_err)?);
        Ok(())
    }

    fn write_section(&mut self, label: &str, dataset: &Dataset) -> tally::Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(tally::Error::Sink(
                "write_section called before begin".to_string(),
            ));
        };
        writeln!(file, "\n{label}:").map_err(sink_err)?;
        writeln!(file, "{}", "=".repeat(20)).map_err(sink_err)?;
        writeln!(file, "Total rows: {}", dataset.len()).map_err(sink_err)?;
        write!(file, "{}", render_grid(dataset)).map_err(sink_err)?;
        writeln!(file).map_err(sink_err)?;
        Ok(())
    }
}

/// Render a dataset as a bordered grid table.
fn render_grid(dataset: &Dataset) -> String {
    if dataset.columns.is_empty() {
        return String::new();
    }

    let mut widths: Vec<usize> = dataset.columns.iter().map(String::len).collect();
    let rendered_rows: Vec<Vec<String>> = dataset
        .rows
        .iter()
        .map(|row| row.iter().map(ToString::to_string).collect())
        .collect();
    for row in &rendered_rows {
        for (idx, cell) in row.iter().enumerate() {
            if idx < widths.len() {
                widths[idx] = widths[idx].max(cell.len());
            }
        }
    }

    let border: String = {
        let mut line = String::from("+");
        for width in &widths {
            line.push_str(&"-".repeat(width + 2));
            line.push('+');
        }
        line.push('\n');
        line
    };

    let render_row = |cells: &[String]| -> String {
        let mut line = String::from("|");
        for (idx, &width) in widths.iter().enumerate() {
            let cell = cells.get(idx).map(String::as_str).unwrap_or("");
            line.push_str(&format!(" {cell:<width$} |"));
        }
        line.push('\n');
        line
    };

    let mut out = String::new();
    out.push_str(&border);
    out.push_str(&render_row(&dataset.columns));
    out.push_str(&border);
    for row in &rendered_rows {
        out.push_str(&render_row(row));
    }
    out.push_str(&border);
    out
}

/// Writes `<dir>/<output_name>_<label>.csv`, one file per section.
pub struct CsvSink {
    dir: PathBuf,
    output_name: Option<String>,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            output_name: None,
        }
    }
}

impl ReportSink for CsvSink {
    fn begin(&mut self, output_name: &str) -> tally::Result<()> {
        fs::create_dir_all(&self.dir).map_err(sink_err)?;

        // Clear every section file a prior run left for this output name.
        let prefix = format!("{output_name}_");
        for entry in fs::read_dir(&self.dir).map_err(sink_err)? {
            let entry = entry.map_err(sink_err)?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(".csv") {
                fs::remove_file(entry.path()).map_err(sink_err)?;
            }
        }

        self.output_name = Some(output_name.to_string());
        Ok(())
    }

    fn write_section(&mut self, label: &str, dataset: &Dataset) -> tally::Result<()> {
        let Some(output_name) = self.output_name.as_deref() else {
            return Err(tally::Error::Sink(
                "write_section called before begin".to_string(),
            ));
        };
        let path = self.dir.join(format!("{output_name}_{label}.csv"));
        let mut writer = csv::Writer::from_path(&path).map_err(sink_err)?;

        writer.write_record(&dataset.columns).map_err(sink_err)?;
        for row in &dataset.rows {
            let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
            writer.write_record(&cells).map_err(sink_err)?;
        }
        writer.flush().map_err(sink_err)?;
        Ok(())
    }
}

/// Fans every call out to all inner sinks.
pub struct MultiSink {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl MultiSink {
    /// The standard report pair: text grid plus CSV, both under `dir`.
    pub fn text_and_csv(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            sinks: vec![
                Box::new(TextSink::new(dir.clone())),
                Box::new(CsvSink::new(dir)),
            ],
        }
    }
}

impl ReportSink for MultiSink {
    fn begin(&mut self, output_name: &str) -> tally::Result<()> {
        for sink in &mut self.sinks {
            sink.begin(output_name)?;
        }
        Ok(())
    }

    fn write_section(&mut self, label: &str, dataset: &Dataset) -> tally::Result<()> {
        for sink in &mut self.sinks {
            sink.write_section(label, dataset)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally::Value;

    fn sample() -> Dataset {
        let mut dataset = Dataset::new(vec!["schema_name".into(), "estimated_rows".into()]);
        dataset.push_row(vec![Value::from("public"), Value::I64(10)]);
        dataset.push_row(vec![Value::from("sales"), Value::Null]);
        dataset
    }

    #[test]
    fn text_sink_renders_a_grid_with_row_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = TextSink::new(dir.path());
        sink.begin("reports").unwrap();
        sink.write_section("RowCountComparison", &sample()).unwrap();

        let content = fs::read_to_string(dir.path().join("reports.txt")).unwrap();
        assert!(content.contains("RowCountComparison:"));
        assert!(content.contains("Total rows: 2"));
        assert!(content.contains("| public"));
        assert!(content.contains("| schema_name"));
    }

    #[test]
    fn begin_reinitializes_instead_of_appending() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = TextSink::new(dir.path());

        sink.begin("reports").unwrap();
        sink.write_section("First", &sample()).unwrap();
        sink.begin("reports").unwrap();
        sink.write_section("Second", &sample()).unwrap();

        let content = fs::read_to_string(dir.path().join("reports.txt")).unwrap();
        assert!(!content.contains("First"));
        assert!(content.contains("Second"));
    }

    #[test]
    fn csv_sink_writes_one_file_per_section_and_clears_stale_ones() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path());

        sink.begin("reports").unwrap();
        sink.write_section("Stale", &sample()).unwrap();
        assert!(dir.path().join("reports_Stale.csv").exists());

        sink.begin("reports").unwrap();
        sink.write_section("Fresh", &sample()).unwrap();
        assert!(!dir.path().join("reports_Stale.csv").exists());

        let content = fs::read_to_string(dir.path().join("reports_Fresh.csv")).unwrap();
        assert!(content.starts_with("schema_name,estimated_rows"));
        assert!(content.contains("public,10"));
        // NULL renders as an empty cell.
        assert!(content.contains("sales,"));
    }

    #[test]
    fn writing_before_begin_is_a_sink_error() {
        let mut sink = CsvSink::new("unused");
        let err = sink.write_section("x", &sample()).unwrap_err();
        assert!(matches!(err, tally::Error::Sink(_)));
    }
}
