use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use scrip_core::{label_stem, ReconSummary, ReportTables, Table};
use tracing::info;

pub const COMMON_FILE: &str = "common_stocks.csv";
pub const SUMMARY_FILE: &str = "summary.json";

/// Locations of the artifacts produced by one report write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportPaths {
    pub common: PathBuf,
    pub only_left: PathBuf,
    pub only_right: PathBuf,
    pub summary: PathBuf,
}

/// Writes the three partition tables and the run summary into one directory.
#[derive(Clone, Debug)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Paths that [`ReportWriter::write`] will use for the given labels.
    pub fn paths(&self, left_label: &str, right_label: &str) -> ReportPaths {
        ReportPaths {
            common: self.output_dir.join(COMMON_FILE),
            only_left: self.output_dir.join(only_in_file(left_label)),
            only_right: self.output_dir.join(only_in_file(right_label)),
            summary: self.output_dir.join(SUMMARY_FILE),
        }
    }

    pub fn write(&self, tables: &ReportTables, summary: &ReconSummary) -> Result<ReportPaths> {
        let paths = self.paths(&summary.left, &summary.right);
        if paths.only_left == paths.only_right {
            bail!(
                "labels '{}' and '{}' both map to {}",
                summary.left,
                summary.right,
                paths.only_left.display()
            );
        }
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;

        write_table(&paths.common, &tables.common)?;
        write_table(&paths.only_left, &tables.only_left)?;
        write_table(&paths.only_right, &tables.only_right)?;

        let file = File::create(&paths.summary)
            .with_context(|| format!("failed to create {}", paths.summary.display()))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, summary)
            .with_context(|| format!("failed to write {}", paths.summary.display()))?;
        out.flush()
            .with_context(|| format!("failed to flush {}", paths.summary.display()))?;

        info!(
            dir = %self.output_dir.display(),
            common = tables.common.len(),
            only_left = tables.only_left.len(),
            only_right = tables.only_right.len(),
            "wrote reconciliation reports"
        );
        Ok(paths)
    }
}

/// `only_in_<label>.csv`, with the label reduced to a safe file-name stem.
pub fn only_in_file(label: &str) -> String {
    format!("only_in_{}.csv", label_stem(label))
}

fn write_table(path: &Path, table: &Table) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrip_core::{default_columns, emit, NormalizedInstrument, Reconciler, SourceKind};

    fn instrument(symbol: &str, name: Option<&str>, source: SourceKind) -> NormalizedInstrument {
        NormalizedInstrument {
            exchange: "NSE".into(),
            trading_symbol: symbol.into(),
            instrument_key: None,
            symbol_name: name.map(str::to_string),
            security_id: None,
            short_name: name.and_then(|n| n.split_whitespace().next()).map(str::to_string),
            name: name.map(str::to_string),
            isin: None,
            source,
        }
    }

    #[test]
    fn writes_three_tables_with_fixed_header() {
        let dir = tempfile::tempdir().unwrap();
        let result = Reconciler::new("upstox", "dhan").reconcile(
            vec![
                instrument("TCS", Some("Tata Consultancy Services"), SourceKind::Upstox),
                instrument("HDFC", None, SourceKind::Upstox),
            ],
            vec![instrument("TCS", Some("TCS"), SourceKind::Dhan)],
        );
        let tables = emit(&result, &default_columns());
        let writer = ReportWriter::new(dir.path().join("out"));
        let paths = writer.write(&tables, &result.summary()).unwrap();

        let header = "exchange,instrument_key,symbol_name,security_id,short_name,name,isin,trading_symbol";
        let common = fs::read_to_string(&paths.common).unwrap();
        assert_eq!(
            common,
            format!("{header}\nNSE,,Tata Consultancy Services,,Tata,Tata Consultancy Services,,TCS\n")
        );
        let only_left = fs::read_to_string(&paths.only_left).unwrap();
        assert_eq!(only_left, format!("{header}\nNSE,,,,,,,HDFC\n"));
        let only_right = fs::read_to_string(&paths.only_right).unwrap();
        assert_eq!(only_right, format!("{header}\n"));
        assert!(paths.only_left.ends_with("only_in_upstox.csv"));
        assert!(paths.only_right.ends_with("only_in_dhan.csv"));

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.summary).unwrap()).unwrap();
        assert_eq!(summary["common"], 1);
        assert_eq!(summary["only_left"], 1);
        assert_eq!(summary["only_right"], 0);
        assert_eq!(summary["validated"], true);
    }

    #[test]
    fn colliding_labels_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let result = Reconciler::new("Upstox", "upstox").reconcile(
            vec![instrument("AAA", None, SourceKind::Upstox)],
            vec![instrument("BBB", None, SourceKind::Dhan)],
        );
        let tables = emit(&result, &default_columns());
        let out = dir.path().join("out");
        let err = ReportWriter::new(&out)
            .write(&tables, &result.summary())
            .unwrap_err();
        assert!(format!("{err:#}").contains("only_in_upstox.csv"));
        assert!(!out.exists());
    }

    #[test]
    fn labels_become_safe_file_names() {
        assert_eq!(only_in_file("Upstox NSE"), "only_in_upstox_nse.csv");
        assert_eq!(only_in_file("../dhan"), "only_in____dhan.csv");
    }
}
