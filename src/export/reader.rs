use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::record::{MetadataValue, SpectrumRecord};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load spectra from a file. Dispatch by extension.
///
/// Reads what [`write_spectra`](super::write_spectra) writes, as well as
/// x/y datasets produced by Pandas or Polars.
pub fn load_spectra(path: &Path) -> Result<Vec<SpectrumRecord>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let spectra = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;
    log::info!("Loaded {} spectra from {}", spectra.len(), path.display());
    Ok(spectra)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

fn load_json(path: &Path) -> Result<Vec<SpectrumRecord>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut spectra = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let x = json_array_to_f64(obj.get("x"), i, "x")?;
        let y = json_array_to_f64(obj.get("y"), i, "y")?;
        if x.len() != y.len() {
            bail!("Row {i}: x has {} values but y has {}", x.len(), y.len());
        }

        let metadata = obj
            .iter()
            .filter(|(key, _)| *key != "x" && *key != "y")
            .map(|(key, val)| (key.clone(), json_to_metadata(val)))
            .collect();

        spectra.push(SpectrumRecord { x, y, metadata });
    }
    Ok(spectra)
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number"))
        })
        .collect()
}

fn json_to_metadata(val: &JsonValue) -> MetadataValue {
    match val {
        JsonValue::String(s) => MetadataValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                MetadataValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                MetadataValue::Float(f)
            } else {
                MetadataValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => MetadataValue::Bool(*b),
        JsonValue::Null => MetadataValue::Null,
        other => MetadataValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

fn load_csv(path: &Path) -> Result<Vec<SpectrumRecord>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let x_idx = headers
        .iter()
        .position(|h| h == "x")
        .context("CSV missing 'x' column")?;
    let y_idx = headers
        .iter()
        .position(|h| h == "y")
        .context("CSV missing 'y' column")?;

    let mut spectra = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;

        let x = parse_semicolon_floats(record.get(x_idx).unwrap_or(""), row_no, "x")?;
        let y = parse_semicolon_floats(record.get(y_idx).unwrap_or(""), row_no, "y")?;
        if x.len() != y.len() {
            bail!(
                "CSV row {row_no}: x has {} values but y has {}",
                x.len(),
                y.len()
            );
        }

        let metadata = record
            .iter()
            .enumerate()
            .filter(|(col, _)| *col != x_idx && *col != y_idx)
            .filter_map(|(col, value)| {
                headers
                    .get(col)
                    .map(|name| (name.clone(), guess_metadata_type(value)))
            })
            .collect();

        spectra.push(SpectrumRecord { x, y, metadata });
    }
    Ok(spectra)
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

fn guess_metadata_type(s: &str) -> MetadataValue {
    if s.is_empty() {
        return MetadataValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return MetadataValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return MetadataValue::Float(f);
    }
    if s == "true" || s == "false" {
        return MetadataValue::Bool(s == "true");
    }
    MetadataValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Expected schema: `x` and `y` as List or LargeList of Float64/Float32;
/// every other column is metadata.
fn load_parquet(path: &Path) -> Result<Vec<SpectrumRecord>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut spectra = Vec::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let x_idx = schema
            .index_of("x")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'x' column"))?;
        let y_idx = schema
            .index_of("y")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'y' column"))?;
        let x_col = batch.column(x_idx);
        let y_col = batch.column(y_idx);

        let meta_cols: Vec<(usize, String)> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != x_idx && *i != y_idx)
            .map(|(i, f)| (i, f.name().clone()))
            .collect();

        for row in 0..batch.num_rows() {
            let x = extract_f64_list(x_col, row)
                .with_context(|| format!("Row {row}: failed to read 'x'"))?;
            let y = extract_f64_list(y_col, row)
                .with_context(|| format!("Row {row}: failed to read 'y'"))?;
            if x.len() != y.len() {
                bail!("Row {row}: x has {} values but y has {}", x.len(), y.len());
            }

            let metadata: BTreeMap<String, MetadataValue> = meta_cols
                .iter()
                .map(|(col_idx, name)| {
                    (name.clone(), extract_metadata_value(batch.column(*col_idx), row))
                })
                .collect();

            spectra.push(SpectrumRecord { x, y, metadata });
        }
    }
    Ok(spectra)
}

// -- Parquet / Arrow helpers --

/// `Vec<f64>` from a List or LargeList column at `row`.
fn extract_f64_list(col: &ArrayRef, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values = match col.data_type() {
        DataType::List(_) => col.as_list::<i32>().value(row),
        DataType::LargeList(_) => col.as_list::<i64>().value(row),
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    match values.data_type() {
        DataType::Float64 => Ok(values
            .as_primitive::<Float64Type>()
            .iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect()),
        DataType::Float32 => Ok(values
            .as_primitive::<Float32Type>()
            .iter()
            .map(|v| v.map_or(f64::NAN, f64::from))
            .collect()),
        other => bail!("List inner type is {other:?}, expected Float64 or Float32"),
    }
}

/// One metadata cell from an Arrow column.
fn extract_metadata_value(col: &ArrayRef, row: usize) -> MetadataValue {
    if col.is_null(row) {
        return MetadataValue::Null;
    }
    match col.data_type() {
        DataType::Utf8 => MetadataValue::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => MetadataValue::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => MetadataValue::Integer(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => MetadataValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::Float32 => {
            MetadataValue::Float(col.as_primitive::<Float32Type>().value(row) as f64)
        }
        DataType::Float64 => MetadataValue::Float(col.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => MetadataValue::Bool(col.as_boolean().value(row)),
        other => MetadataValue::String(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::write_spectra;

    fn sample_records() -> Vec<SpectrumRecord> {
        let mut a = SpectrumRecord {
            x: vec![400.0, 400.5, 401.25],
            y: vec![0.125, 0.5, 0.375],
            ..SpectrumRecord::default()
        };
        a.metadata.insert("name".into(), MetadataValue::from("neon"));
        a.metadata.insert("polynomial_order".into(), MetadataValue::Integer(2));
        a.metadata.insert("exposure".into(), MetadataValue::Float(1.5));

        let mut b = SpectrumRecord {
            x: vec![1.0, 2.0],
            y: vec![3.0, 4.0],
            ..SpectrumRecord::default()
        };
        b.metadata.insert("name".into(), MetadataValue::from("mercury"));
        b.metadata.insert("polynomial_order".into(), MetadataValue::Integer(1));
        b.metadata.insert("exposure".into(), MetadataValue::Float(0.25));
        vec![a, b]
    }

    fn round_trip(ext: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("spectra.{ext}"));
        let records = sample_records();
        write_spectra(&path, &records).unwrap();
        let loaded = load_spectra(&path).unwrap();
        assert_eq!(loaded, records, "format {ext}");
    }

    #[test]
    fn test_json_round_trip() {
        round_trip("json");
    }

    #[test]
    fn test_csv_round_trip() {
        round_trip("csv");
    }

    #[test]
    fn test_parquet_round_trip() {
        round_trip("parquet");
    }

    #[test]
    fn test_missing_metadata_becomes_null_in_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.parquet");
        let mut records = sample_records();
        records[1].metadata.remove("exposure");
        write_spectra(&path, &records).unwrap();
        let loaded = load_spectra(&path).unwrap();
        assert_eq!(loaded[1].metadata["exposure"], MetadataValue::Null);
        assert_eq!(loaded[0].metadata["exposure"], MetadataValue::Float(1.5));
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_spectra(&dir.path().join("a.txt"), &sample_records()).is_err());
        assert!(load_spectra(&dir.path().join("a.txt")).is_err());
    }

    #[test]
    fn test_mismatched_lengths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"[{"x": [1, 2], "y": [1]}]"#).unwrap();
        assert!(load_spectra(&path).is_err());
    }
}
