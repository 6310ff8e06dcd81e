//! Staged-file discovery and loading.
//!
//! The staging collaborator leaves one directory per relation, partitioned by
//! staging date (`<staging>/<relation>/<YYYY>/<MM>/<DD>/<relation>.<ext>`).
//! This module finds the latest partition of each relation, reads it into
//! typed records and rejects anything that violates the relation's schema.

use std::path::{Path, PathBuf};

use audit_core::error::{AuditError, Result};
use audit_core::models::{PriceListEntry, UnitConversionFactor, UsageRecord};
use audit_core::time_utils::parse_staging_partition;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

// ── Relation names ────────────────────────────────────────────────────────────

pub const USAGE_RELATION: &str = "usage";
pub const PRICES_RELATION: &str = "prices";
pub const UNIT_FACTORS_RELATION: &str = "unit_factors";

// ── Public types ──────────────────────────────────────────────────────────────

/// Paths of the three staged input files for one run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StagedInputs {
    pub usage: PathBuf,
    pub prices: PathBuf,
    pub unit_factors: PathBuf,
}

/// The three input relations, fully loaded and validated.
#[derive(Debug, Clone, Default)]
pub struct StagedSnapshot {
    pub usage: Vec<UsageRecord>,
    pub prices: Vec<PriceListEntry>,
    pub unit_factors: Vec<UnitConversionFactor>,
}

impl StagedSnapshot {
    /// Fail when any relation holds no rows.
    pub fn ensure_non_empty(&self) -> Result<()> {
        if self.usage.is_empty() {
            return Err(AuditError::EmptyRelation(USAGE_RELATION.to_string()));
        }
        if self.prices.is_empty() {
            return Err(AuditError::EmptyRelation(PRICES_RELATION.to_string()));
        }
        if self.unit_factors.is_empty() {
            return Err(AuditError::EmptyRelation(UNIT_FACTORS_RELATION.to_string()));
        }
        Ok(())
    }
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Find the most recently staged file for `relation` under `staging_dir`.
///
/// Candidates are files named `<relation>.<ext>` for one of `extensions`
/// anywhere below `<staging_dir>/<relation>/`. Files inside a valid date
/// partition win over unpartitioned ones; ties break on path order.
pub fn find_staged_file(staging_dir: &Path, relation: &str, extensions: &[&str]) -> Option<PathBuf> {
    let root = staging_dir.join(relation);
    if !root.exists() {
        warn!("Staging path does not exist: {}", root.display());
        return None;
    }

    walkdir::WalkDir::new(&root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let path = entry.path();
            entry.file_type().is_file()
                && path.file_stem().map(|s| s == relation).unwrap_or(false)
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| extensions.contains(&ext))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .max_by_key(|path| (partition_of(path), path.clone()))
}

fn partition_of(path: &Path) -> Option<NaiveDate> {
    parse_staging_partition(&path.to_string_lossy())
}

/// Resolve the three input paths: explicit files win, otherwise discover the
/// latest partition under `staging_dir`.
pub fn resolve_inputs(
    staging_dir: Option<&Path>,
    usage_file: Option<&Path>,
    prices_file: Option<&Path>,
    unit_factors_file: Option<&Path>,
) -> Result<StagedInputs> {
    let inputs = StagedInputs {
        usage: resolve_one(staging_dir, usage_file, USAGE_RELATION, &["csv"])?,
        prices: resolve_one(staging_dir, prices_file, PRICES_RELATION, &["json", "jsonl"])?,
        unit_factors: resolve_one(
            staging_dir,
            unit_factors_file,
            UNIT_FACTORS_RELATION,
            &["csv"],
        )?,
    };
    debug!(?inputs, "resolved staged inputs");
    Ok(inputs)
}

fn resolve_one(
    staging_dir: Option<&Path>,
    explicit: Option<&Path>,
    relation: &str,
    extensions: &[&str],
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let Some(dir) = staging_dir else {
        return Err(AuditError::Config(format!(
            "no staging directory and no explicit {relation} file given"
        )));
    };
    find_staged_file(dir, relation, extensions).ok_or_else(|| AuditError::MissingInput {
        relation: relation.to_string(),
        path: dir.join(relation),
    })
}

/// Read all three relations and check that none is empty.
pub fn load_snapshot(inputs: &StagedInputs) -> Result<StagedSnapshot> {
    let snapshot = StagedSnapshot {
        usage: read_usage_csv(&inputs.usage)?,
        prices: read_prices_json(&inputs.prices)?,
        unit_factors: read_unit_factors_csv(&inputs.unit_factors)?,
    };
    snapshot.ensure_non_empty()?;
    info!(
        usage = snapshot.usage.len(),
        prices = snapshot.prices.len(),
        unit_factors = snapshot.unit_factors.len(),
        "staged snapshot loaded"
    );
    Ok(snapshot)
}

// ── CSV relations ─────────────────────────────────────────────────────────────

/// Read the staged usage CSV.
///
/// Empty fields are nulls. `net_cost`, `usage_amount` and `start_date`
/// (`YYYY-MM-DD`) are required on every row.
pub fn read_usage_csv(path: &Path) -> Result<Vec<UsageRecord>> {
    let records: Vec<UsageRecord> = read_csv(path, USAGE_RELATION)?;
    for (idx, record) in records.iter().enumerate() {
        for (column, value) in [
            ("net_cost", record.net_cost),
            ("usage_amount", record.usage_amount),
        ] {
            if !value.is_finite() {
                return Err(invalid(USAGE_RELATION, idx + 1, format!("{column} is not finite")));
            }
        }
    }
    Ok(records)
}

/// Read the staged unit-conversion factor CSV.
pub fn read_unit_factors_csv(path: &Path) -> Result<Vec<UnitConversionFactor>> {
    let records: Vec<UnitConversionFactor> = read_csv(path, UNIT_FACTORS_RELATION)?;
    for (idx, record) in records.iter().enumerate() {
        if record.unidad_factor.is_some_and(|f| !f.is_finite()) {
            return Err(invalid(
                UNIT_FACTORS_RELATION,
                idx + 1,
                "unidad_factor is not finite".to_string(),
            ));
        }
    }
    Ok(records)
}

fn read_csv<T: DeserializeOwned>(path: &Path, relation: &str) -> Result<Vec<T>> {
    let file = std::fs::File::open(path).map_err(|source| AuditError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(std::io::BufReader::new(file));

    let mut records = Vec::new();
    for (idx, row) in reader.deserialize::<T>().enumerate() {
        let record = row.map_err(|e| match e.position() {
            Some(_) => invalid(relation, idx + 1, e.to_string()),
            None => AuditError::CsvParse(e),
        })?;
        records.push(record);
    }

    debug!("Read {} {} rows from {}", records.len(), relation, path.display());
    Ok(records)
}

// ── Price list (schema-inferred JSON) ─────────────────────────────────────────

/// Read the staged price list.
///
/// Three layouts are accepted: an array of records, one record per line
/// (JSON Lines), or a column-oriented object (`{"column": {"0": v, ...}}`).
/// Keys are looked up by name; unknown keys are ignored and missing keys are
/// null. `precio_lista` may be a number or a numeric string.
pub fn read_prices_json(path: &Path) -> Result<Vec<PriceListEntry>> {
    let content = std::fs::read_to_string(path).map_err(|source| AuditError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let rows = parse_price_rows(&content)?;
    let entries = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| price_from_value(row, idx + 1))
        .collect::<Result<Vec<_>>>()?;

    debug!("Read {} price rows from {}", entries.len(), path.display());
    Ok(entries)
}

fn parse_price_rows(content: &str) -> Result<Vec<Value>> {
    let trimmed = content.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    // A single object is either column-oriented or the first of many lines.
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        if is_column_oriented(&map) {
            return Ok(columns_to_rows(map));
        }
        return Ok(vec![Value::Object(map)]);
    }

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(AuditError::from))
        .collect()
}

fn is_column_oriented(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.values().all(Value::is_object)
}

/// Pivot `{"col": {"0": a, "1": b}}` into `[{"col": a}, {"col": b}]`.
///
/// Row order follows the numeric value of the index keys.
fn columns_to_rows(columns: Map<String, Value>) -> Vec<Value> {
    let mut rows: std::collections::BTreeMap<(u64, String), Map<String, Value>> =
        std::collections::BTreeMap::new();
    for (column, cells) in columns {
        let Value::Object(cells) = cells else { continue };
        for (index, value) in cells {
            let order = index.parse::<u64>().unwrap_or(u64::MAX);
            rows.entry((order, index))
                .or_default()
                .insert(column.clone(), value);
        }
    }
    rows.into_values().map(Value::Object).collect()
}

fn price_from_value(row: &Value, row_no: usize) -> Result<PriceListEntry> {
    let Value::Object(obj) = row else {
        return Err(invalid(PRICES_RELATION, row_no, "row is not a JSON object".to_string()));
    };
    Ok(PriceListEntry {
        product_code: text_field(obj, "product_code"),
        product_name: text_field(obj, "product_name"),
        pricing_term: text_field(obj, "pricing_term"),
        pricing_unit: text_field(obj, "pricing_unit"),
        instance_type: text_field(obj, "instance_type"),
        precio_lista: number_field(obj, "precio_lista")
            .map_err(|reason| invalid(PRICES_RELATION, row_no, reason))?,
    })
}

/// A string-typed column. Inferred schemas may type codes as numbers, so
/// numbers and booleans are rendered to text; null and missing are `None`.
fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn number_field(obj: &Map<String, Value>, key: &str) -> std::result::Result<Option<f64>, String> {
    let value = match obj.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match value {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(format!("{key} is not a finite number")),
    }
}

fn invalid(relation: &str, row: usize, reason: String) -> AuditError {
    AuditError::InvalidRecord {
        relation: relation.to_string(),
        row,
        reason,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const USAGE_HEADER: &str = "account_id,instance_type,net_cost,pricing_term,pricing_unit,product_code,product_name,region,service_code,start_date,tag_application,usage_amount,usage_type";

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    // ── read_usage_csv ────────────────────────────────────────────────────────

    #[test]
    fn test_read_usage_csv_parses_rows_and_nulls() {
        let tmp = TempDir::new().unwrap();
        let content = format!(
            "{USAGE_HEADER}\n\
             111,m5.large,12.5,OnDemand,Hrs,AmazonEC2,Amazon Elastic Compute Cloud,us-east-1,AmazonEC2,2024-01-15,web,100,BoxUsage\n\
             111,,-3,,,AmazonS3,,,,2024-02-01,,0,\n"
        );
        let path = write(tmp.path(), "usage.csv", &content);

        let rows = read_usage_csv(&path).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].instance_type.as_deref(), Some("m5.large"));
        assert_eq!(rows[0].usage_amount, 100.0);
        assert_eq!(rows[0].start_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert!(rows[1].instance_type.is_none());
        assert!(rows[1].service_code.is_none());
        assert_eq!(rows[1].net_cost, -3.0);
    }

    #[test]
    fn test_read_usage_csv_rejects_missing_start_date() {
        let tmp = TempDir::new().unwrap();
        let content = format!("{USAGE_HEADER}\n111,,1,,,AmazonEC2,,,,,,1,\n");
        let path = write(tmp.path(), "usage.csv", &content);

        let err = read_usage_csv(&path).unwrap_err();
        assert!(matches!(err, AuditError::InvalidRecord { row: 1, .. }), "{err}");
    }

    #[test]
    fn test_read_usage_csv_rejects_bad_number() {
        let tmp = TempDir::new().unwrap();
        let content = format!("{USAGE_HEADER}\n111,,abc,,,AmazonEC2,,,,2024-01-01,,1,\n");
        let path = write(tmp.path(), "usage.csv", &content);

        assert!(matches!(
            read_usage_csv(&path),
            Err(AuditError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_read_usage_csv_rejects_nan() {
        let tmp = TempDir::new().unwrap();
        let content = format!("{USAGE_HEADER}\n111,,NaN,,,AmazonEC2,,,,2024-01-01,,1,\n");
        let path = write(tmp.path(), "usage.csv", &content);

        let err = read_usage_csv(&path).unwrap_err();
        assert!(err.to_string().contains("net_cost"));
    }

    #[test]
    fn test_read_usage_csv_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = read_usage_csv(&tmp.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, AuditError::FileRead { .. }));
    }

    // ── read_unit_factors_csv ─────────────────────────────────────────────────

    #[test]
    fn test_read_unit_factors_csv() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            tmp.path(),
            "unit_factors.csv",
            "pricing_unit,unidad_factor\nHrs,1\nGB-Mo,1024\nRequests,\n",
        );

        let rows = read_unit_factors_csv(&path).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].unidad_factor, Some(1024.0));
        assert_eq!(rows[2].unidad_factor, None);
    }

    // ── read_prices_json ──────────────────────────────────────────────────────

    #[test]
    fn test_read_prices_json_array() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            tmp.path(),
            "prices.json",
            r#"[
                {"product_code": "AmazonEC2", "product_name": "EC2", "pricing_term": "OnDemand",
                 "pricing_unit": "Hrs", "instance_type": "m5.large", "precio_lista": 0.096},
                {"product_code": "AmazonS3", "product_name": "S3", "pricing_term": "OnDemand",
                 "pricing_unit": "GB-Mo", "precio_lista": "0.023", "extra": true}
            ]"#,
        );

        let rows = read_prices_json(&path).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].precio_lista, Some(0.096));
        assert_eq!(rows[1].instance_type, None);
        assert_eq!(rows[1].precio_lista, Some(0.023));
    }

    #[test]
    fn test_read_prices_json_lines() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            tmp.path(),
            "prices.jsonl",
            "{\"product_code\": \"A\", \"precio_lista\": 1}\n\n{\"product_code\": \"B\", \"precio_lista\": null}\n",
        );

        let rows = read_prices_json(&path).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].product_code.as_deref(), Some("A"));
        assert_eq!(rows[1].precio_lista, None);
    }

    #[test]
    fn test_read_prices_json_column_oriented() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            tmp.path(),
            "prices.json",
            r#"{"product_code": {"0": "A", "1": "B", "10": "C"},
                "precio_lista": {"0": 1.5, "1": 2.5, "10": 3.5}}"#,
        );

        let rows = read_prices_json(&path).unwrap();

        let codes: Vec<_> = rows.iter().map(|r| r.product_code.clone().unwrap()).collect();
        assert_eq!(codes, vec!["A", "B", "C"]);
        assert_eq!(rows[2].precio_lista, Some(3.5));
    }

    #[test]
    fn test_read_prices_json_numeric_code_is_text() {
        let tmp = TempDir::new().unwrap();
        let path = write(tmp.path(), "prices.json", r#"[{"product_code": 42, "precio_lista": 1}]"#);

        let rows = read_prices_json(&path).unwrap();
        assert_eq!(rows[0].product_code.as_deref(), Some("42"));
    }

    #[test]
    fn test_read_prices_json_rejects_non_numeric_price() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            tmp.path(),
            "prices.json",
            r#"[{"product_code": "A", "precio_lista": "cheap"}]"#,
        );

        let err = read_prices_json(&path).unwrap_err();
        assert!(matches!(err, AuditError::InvalidRecord { row: 1, .. }), "{err}");
    }

    #[test]
    fn test_read_prices_json_rejects_non_object_row() {
        let tmp = TempDir::new().unwrap();
        let path = write(tmp.path(), "prices.json", "[1, 2]");

        assert!(matches!(
            read_prices_json(&path),
            Err(AuditError::InvalidRecord { .. })
        ));
    }

    // ── discovery ─────────────────────────────────────────────────────────────

    #[test]
    fn test_find_staged_file_picks_latest_partition() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "usage/2024/05/31/usage.csv", "x");
        let latest = write(tmp.path(), "usage/2024/06/01/usage.csv", "x");
        write(tmp.path(), "usage/2024/06/01/other.csv", "x");

        let found = find_staged_file(tmp.path(), USAGE_RELATION, &["csv"]);
        assert_eq!(found, Some(latest));
    }

    #[test]
    fn test_find_staged_file_prefers_partitioned() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "prices/prices.json", "[]");
        let dated = write(tmp.path(), "prices/2023/01/01/prices.json", "[]");

        let found = find_staged_file(tmp.path(), PRICES_RELATION, &["json"]);
        assert_eq!(found, Some(dated));
    }

    #[test]
    fn test_find_staged_file_missing_relation_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(find_staged_file(tmp.path(), USAGE_RELATION, &["csv"]).is_none());
    }

    #[test]
    fn test_resolve_inputs_explicit_paths_win() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "usage/2024/06/01/usage.csv", "x");
        write(tmp.path(), "prices/2024/06/01/prices.json", "[]");
        write(tmp.path(), "unit_factors/2024/06/01/unit_factors.csv", "x");
        let explicit = tmp.path().join("elsewhere.csv");

        let inputs = resolve_inputs(Some(tmp.path()), Some(&explicit), None, None).unwrap();

        assert_eq!(inputs.usage, explicit);
        assert!(inputs.prices.ends_with("2024/06/01/prices.json"));
    }

    #[test]
    fn test_resolve_inputs_missing_relation_is_error() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "usage/2024/06/01/usage.csv", "x");

        let err = resolve_inputs(Some(tmp.path()), None, None, None).unwrap_err();
        assert!(matches!(err, AuditError::MissingInput { ref relation, .. } if relation == "prices"));
    }

    #[test]
    fn test_resolve_inputs_without_staging_dir() {
        let err = resolve_inputs(None, None, None, None).unwrap_err();
        assert!(matches!(err, AuditError::Config(_)));
    }

    // ── load_snapshot ─────────────────────────────────────────────────────────

    #[test]
    fn test_load_snapshot_rejects_empty_relation() {
        let tmp = TempDir::new().unwrap();
        let usage = write(
            tmp.path(),
            "usage.csv",
            &format!("{USAGE_HEADER}\n1,,1,,,A,,,,2024-01-01,,1,\n"),
        );
        let prices = write(tmp.path(), "prices.json", "[]");
        let factors = write(tmp.path(), "unit_factors.csv", "pricing_unit,unidad_factor\nHrs,1\n");

        let err = load_snapshot(&StagedInputs {
            usage,
            prices,
            unit_factors: factors,
        })
        .unwrap_err();

        assert!(matches!(err, AuditError::EmptyRelation(ref r) if r == "prices"));
    }
}
