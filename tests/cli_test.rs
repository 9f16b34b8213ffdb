//! Command-line behavior of the sql-seeder binary.

use sql_seeder::db::{DatabaseAccess, DuckDbDatabase};
use std::fs;
use std::process::Command;
use tempfile::TempDir;

const DDL: &str = "
CREATE TABLE regions (id INT PRIMARY KEY, name VARCHAR(30) NOT NULL);
CREATE TABLE stores (
    id INT PRIMARY KEY,
    region_id INT NOT NULL REFERENCES regions(id),
    opened DATE
);
";

fn sql_seeder_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sql-seeder"))
}

fn write_ddl(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("schema.sql");
    fs::write(&path, DDL).unwrap();
    path
}

#[test]
fn test_generate_into_database_file() {
    let dir = TempDir::new().unwrap();
    let ddl = write_ddl(&dir);
    let db_path = dir.path().join("shop.duckdb");

    let output = sql_seeder_bin()
        .arg("generate")
        .arg(&db_path)
        .arg("--ddl")
        .arg(&ddl)
        .args(["--table-rows", "regions=5,stores=20", "--seed", "3", "-q"])
        .output()
        .unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {}", stderr);
    assert!(stderr.contains("Generation completed successfully"));
    assert!(stderr.contains("stores [DONE]: 20 / 20 rows"));

    let db = DuckDbDatabase::open(&db_path).unwrap();
    assert_eq!(db.count_rows("regions").unwrap(), 5);
    assert_eq!(db.count_rows("stores").unwrap(), 20);
}

#[test]
fn test_dry_run_leaves_database_empty() {
    let dir = TempDir::new().unwrap();
    let ddl = write_ddl(&dir);
    let db_path = dir.path().join("shop.duckdb");

    let output = sql_seeder_bin()
        .arg("generate")
        .arg(&db_path)
        .arg("--ddl")
        .arg(&ddl)
        .args(["--rows", "10", "--dry-run", "-q"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Dry run"));

    let db = DuckDbDatabase::open(&db_path).unwrap();
    assert_eq!(db.count_rows("regions").unwrap(), 0);
    assert_eq!(db.count_rows("stores").unwrap(), 0);
}

#[test]
fn test_plan_lists_stages() {
    let dir = TempDir::new().unwrap();
    let ddl = write_ddl(&dir);

    let output = sql_seeder_bin()
        .arg("plan")
        .arg("--ddl")
        .arg(&ddl)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stage0 = stdout.find("Stage 0:").unwrap();
    let stage1 = stdout.find("Stage 1:").unwrap();
    let regions = stdout.find("regions (100 rows)").unwrap();
    let stores = stdout.find("stores (100 rows)").unwrap();
    assert!(stage0 < regions && regions < stage1 && stage1 < stores);
}

#[test]
fn test_unknown_executor_is_rejected() {
    let dir = TempDir::new().unwrap();
    let ddl = write_ddl(&dir);

    let output = sql_seeder_bin()
        .arg("generate")
        .arg("--ddl")
        .arg(&ddl)
        .args(["--executor", "fibers"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown executor"));
}

#[test]
fn test_requires_database_or_ddl() {
    let output = sql_seeder_bin().arg("generate").output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--ddl"));
}

#[test]
fn test_unknown_table_in_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let ddl = write_ddl(&dir);
    let config = dir.path().join("seed.yaml");
    fs::write(&config, "tables:\n  warehouses:\n    rows_to_generate: 5\n").unwrap();

    let output = sql_seeder_bin()
        .arg("generate")
        .arg("--ddl")
        .arg(&ddl)
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("warehouses"));
}

#[test]
fn test_init_config_writes_and_protects_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conf").join("seed.yaml");

    let output = sql_seeder_bin()
        .arg("init-config")
        .arg("--output")
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("duplicate_strategy"));

    let again = sql_seeder_bin()
        .arg("init-config")
        .arg("--output")
        .arg(&path)
        .output()
        .unwrap();
    assert!(!again.status.success());
    assert!(String::from_utf8_lossy(&again.stderr).contains("--force"));

    let forced = sql_seeder_bin()
        .arg("init-config")
        .arg("--output")
        .arg(&path)
        .arg("--force")
        .output()
        .unwrap();
    assert!(forced.status.success());
}

#[test]
fn test_analyze_after_generate() {
    let dir = TempDir::new().unwrap();
    let ddl = write_ddl(&dir);
    let db_path = dir.path().join("shop.duckdb");

    let generated = sql_seeder_bin()
        .arg("generate")
        .arg(&db_path)
        .arg("--ddl")
        .arg(&ddl)
        .args(["--table-rows", "regions=4,stores=9", "--seed", "2", "-q"])
        .output()
        .unwrap();
    assert!(generated.status.success());

    let saved = dir.path().join("analysis.yaml");
    let output = sql_seeder_bin()
        .arg("analyze")
        .arg(&db_path)
        .arg("--output")
        .arg(&saved)
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("regions"));
    assert!(stdout.contains("TOTAL"));

    let yaml: serde_json::Value =
        serde_yaml_ng::from_str(&fs::read_to_string(&saved).unwrap()).unwrap();
    assert_eq!(yaml["total_rows"], 13);
    let stores = yaml["tables"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "stores")
        .unwrap();
    assert_eq!(stores["row_count"], 9);
    assert_eq!(stores["foreign_keys"][0]["referenced_table"], "regions");
}

#[test]
fn test_analyze_unknown_table_fails() {
    let dir = TempDir::new().unwrap();
    let ddl = write_ddl(&dir);
    let output = sql_seeder_bin()
        .arg("analyze")
        .arg("--ddl")
        .arg(&ddl)
        .args(["--tables", "nope"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_schema_list() {
    let output = sql_seeder_bin().args(["schema", "--list"]).output().unwrap();
    assert!(output.status.success());
    let names: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(names, vec!["analysis", "config", "plan", "report"]);
}

#[test]
fn test_completions() {
    let output = sql_seeder_bin()
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("sql-seeder"));
}
