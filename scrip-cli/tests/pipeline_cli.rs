use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use rusqlite::Connection;
use tempfile::tempdir;

const UPSTOX_CSV: &str = "\
exchange,instrument_type,instrument_key,tradingsymbol,name
NSE_EQ,EQUITY,NSE_EQ|INE123456789,TCS,Tata Consultancy Services
NSE_EQ,EQUITY,NSE_EQ|INE987654321,INFY,Infosys Limited
NSE_FO,FUTIDX,NSE_FO|INE111111111,NIFTY,Nifty
NSE_EQ,EQUITY,NSE_EQ|INE222222222,TCS,Tata Consultancy Services
";

const DHAN_CSV: &str = "\
SEM_EXM_EXCH_ID,SEM_INSTRUMENT_NAME,SEM_TRADING_SYMBOL,SM_SYMBOL_NAME,SEM_SMST_SECURITY_ID
NSE,EQUITY,TCS,TCS,1234
NSE,EQUITY,INFY,INFOSYS,5678
NSE,FUTIDX,NIFTY,NIFTY,9012
BSE,EQUITY,TCS,TCS,3456
";

const HEADER: &str =
    "exchange,instrument_key,symbol_name,security_id,short_name,name,isin,trading_symbol";

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    config: PathBuf,
    upstox: PathBuf,
    dhan: PathBuf,
}

impl Fixture {
    fn new() -> Result<Self> {
        let dir = tempdir()?;
        let root = dir.path().to_path_buf();
        let upstox = root.join("NSE.csv");
        let dhan = root.join("api-scrip-master.csv");
        fs::write(&upstox, UPSTOX_CSV)?;
        fs::write(&dhan, DHAN_CSV)?;
        let config = root.join("scrip.toml");
        fs::write(
            &config,
            format!(
                r#"
[report]
output_dir = '{out}'

[storage.sqlite]
path = '{db}'
table = "dhan_nse"

[storage.documents]
path = '{docs}'
collection = "upstox_nse"
"#,
                out = root.join("outputs").display(),
                db = root.join("database/test.db").display(),
                docs = root.join("database/documents").display(),
            ),
        )?;
        Ok(Self {
            _dir: dir,
            root,
            config,
            upstox,
            dhan,
        })
    }

    fn command(&self, args: &[&str]) -> Command {
        let binary = assert_cmd::cargo::cargo_bin!("scrip-cli");
        let mut cmd = Command::new(binary);
        cmd.current_dir(&self.root);
        cmd.env_remove("RUST_LOG");
        cmd.arg("--config").arg(&self.config);
        cmd.args(args);
        cmd
    }

    fn sources(&self) -> Vec<String> {
        vec![
            "--left".into(),
            self.upstox.display().to_string(),
            "--right".into(),
            self.dhan.display().to_string(),
        ]
    }

    fn output(&self, name: &str) -> PathBuf {
        self.root.join("outputs").join(name)
    }
}

fn read(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?)
}

#[test]
fn run_reconciles_and_loads_both_sinks() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut args = vec!["run".to_string()];
    args.extend(fixture.sources());
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    fixture.command(&args).assert().success();

    let common = read(&fixture.output("common_stocks.csv"))?;
    let lines: Vec<_> = common.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], HEADER);
    assert_eq!(
        lines[1],
        "NSE,NSE_EQ|INE123456789,Tata Consultancy Services,1234,Tata,Tata Consultancy Services,INE123456789,TCS"
    );
    assert_eq!(
        lines[2],
        "NSE,NSE_EQ|INE987654321,Infosys Limited,5678,Infosys,Infosys Limited,INE987654321,INFY"
    );
    assert_eq!(read(&fixture.output("only_in_upstox.csv"))?, format!("{HEADER}\n"));
    assert_eq!(read(&fixture.output("only_in_dhan.csv"))?, format!("{HEADER}\n"));

    let summary: serde_json::Value = serde_json::from_str(&read(&fixture.output("summary.json"))?)?;
    assert_eq!(summary["common"], 2);
    assert_eq!(summary["union"], 2);
    assert_eq!(summary["validated"], true);
    let anomalies = summary["anomalies"].as_array().expect("anomalies");
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0]["kind"], "duplicate_key_collision");
    assert_eq!(anomalies[0]["trading_symbol"], "TCS");

    let conn = Connection::open(fixture.root.join("database/test.db"))?;
    let mut stmt =
        conn.prepare("SELECT trading_symbol, security_id FROM dhan_nse ORDER BY trading_symbol")?;
    let rows: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;
    assert_eq!(
        rows,
        vec![
            ("INFY".to_string(), "5678".to_string()),
            ("TCS".to_string(), "1234".to_string())
        ]
    );
    assert!(fixture.root.join("database/documents").exists());
    Ok(())
}

#[test]
fn diff_leaves_sinks_untouched() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut args = vec!["diff".to_string()];
    args.extend(fixture.sources());
    let out = fixture.root.join("diff-out");
    args.push("--output".into());
    args.push(out.display().to_string());
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    fixture.command(&args).assert().success();

    assert!(out.join("common_stocks.csv").exists());
    assert!(out.join("summary.json").exists());
    assert!(!fixture.root.join("database").exists());
    Ok(())
}

#[test]
fn fetch_writes_raw_snapshots() -> Result<()> {
    let fixture = Fixture::new()?;
    let raw = fixture.root.join("data");
    let mut args = vec!["fetch".to_string()];
    args.extend(fixture.sources());
    args.push("--raw-dir".into());
    args.push(raw.display().to_string());
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    fixture.command(&args).assert().success();

    assert_eq!(read(&raw.join("upstox_raw.csv"))?, UPSTOX_CSV);
    assert_eq!(read(&raw.join("dhan_sample.csv"))?.lines().count(), 5);
    Ok(())
}

#[test]
fn fetch_requires_a_raw_dir() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.command(&["fetch"]).assert().failure();
    Ok(())
}

#[test]
fn missing_source_fails_the_run() -> Result<()> {
    let fixture = Fixture::new()?;
    let missing = fixture.root.join("absent.csv");
    fixture
        .command(&[
            "run",
            "--left",
            missing.to_str().unwrap(),
            "--right",
            fixture.dhan.to_str().unwrap(),
        ])
        .assert()
        .failure();
    assert!(!fixture.output("common_stocks.csv").exists());
    Ok(())
}

#[test]
fn config_command_prints_effective_settings() -> Result<()> {
    let fixture = Fixture::new()?;
    let output = fixture.command(&["config"]).output()?;
    assert!(output.status.success());
    let rendered = String::from_utf8(output.stdout)?;
    assert!(rendered.contains("dhan_nse"));
    assert!(rendered.contains("outputs"));
    Ok(())
}
