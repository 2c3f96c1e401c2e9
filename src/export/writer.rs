use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Float64Builder, Int64Array, ListBuilder, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde_json::{Map, Value as JsonValue};

use super::record::{MetadataValue, SpectrumRecord};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Write spectra to a file. Dispatch by extension.
///
/// * `.parquet` – `x` / `y` list columns plus one column per metadata key
/// * `.json`    – `[{ "x": [...], "y": [...], ...meta }, ...]`
/// * `.csv`     – `x` / `y` cells holding semicolon-separated floats
pub fn write_spectra(path: &Path, records: &[SpectrumRecord]) -> Result<()> {
    for (i, r) in records.iter().enumerate() {
        if r.x.len() != r.y.len() {
            bail!("Spectrum {i}: x has {} values but y has {}", r.x.len(), r.y.len());
        }
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => write_parquet(path, records),
        "json" => write_json(path, records),
        "csv" => write_csv(path, records),
        other => bail!("Unsupported file extension: .{other}"),
    }?;
    log::info!("Exported {} spectra to {}", records.len(), path.display());
    Ok(())
}

/// Union of metadata keys over all records, sorted.
fn metadata_columns(records: &[SpectrumRecord]) -> Vec<String> {
    records
        .iter()
        .flat_map(|r| r.metadata.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ---------------------------------------------------------------------------
// JSON writer
// ---------------------------------------------------------------------------

fn write_json(path: &Path, records: &[SpectrumRecord]) -> Result<()> {
    let rows: Vec<JsonValue> = records
        .iter()
        .map(|r| {
            let mut obj = Map::new();
            obj.insert("x".into(), JsonValue::from(r.x.clone()));
            obj.insert("y".into(), JsonValue::from(r.y.clone()));
            for (key, value) in &r.metadata {
                obj.insert(key.clone(), metadata_to_json(value));
            }
            JsonValue::Object(obj)
        })
        .collect();
    let text = serde_json::to_string_pretty(&rows).context("serializing JSON")?;
    std::fs::write(path, text).context("writing JSON file")
}

fn metadata_to_json(value: &MetadataValue) -> JsonValue {
    match value {
        MetadataValue::String(s) => JsonValue::from(s.as_str()),
        MetadataValue::Integer(i) => JsonValue::from(*i),
        MetadataValue::Float(f) => JsonValue::from(*f),
        MetadataValue::Bool(b) => JsonValue::from(*b),
        MetadataValue::Null => JsonValue::Null,
    }
}

// ---------------------------------------------------------------------------
// CSV writer
// ---------------------------------------------------------------------------

fn write_csv(path: &Path, records: &[SpectrumRecord]) -> Result<()> {
    let columns = metadata_columns(records);
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;

    let mut header = vec!["x".to_string(), "y".to_string()];
    header.extend(columns.iter().cloned());
    writer.write_record(&header).context("writing CSV header")?;

    for r in records {
        let mut row = vec![join_semicolon(&r.x), join_semicolon(&r.y)];
        row.extend(columns.iter().map(|c| {
            r.metadata
                .get(c)
                .map(ToString::to_string)
                .unwrap_or_default()
        }));
        writer.write_record(&row).context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

fn join_semicolon(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

// ---------------------------------------------------------------------------
// Parquet writer
// ---------------------------------------------------------------------------

fn list_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
        false,
    )
}

fn list_array<'a>(rows: impl Iterator<Item = &'a Vec<f64>>) -> ArrayRef {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        let values = builder.values();
        for &v in row {
            values.append_value(v);
        }
        builder.append(true);
    }
    Arc::new(builder.finish())
}

/// Arrow column for one metadata key. The type follows the non-null
/// values: a single scalar kind keeps its type (integers widen to floats
/// when mixed with them), anything else is written as text.
fn metadata_array(records: &[SpectrumRecord], key: &str) -> (DataType, ArrayRef) {
    let cells: Vec<&MetadataValue> = records
        .iter()
        .map(|r| r.metadata.get(key).unwrap_or(&MetadataValue::Null))
        .collect();
    let present = || cells.iter().filter(|v| !matches!(v, MetadataValue::Null));

    let all_int = present().all(|v| matches!(v, MetadataValue::Integer(_)));
    let all_num = present().all(|v| v.as_f64().is_some());
    let all_bool = present().all(|v| matches!(v, MetadataValue::Bool(_)));
    let any = present().next().is_some();

    if any && all_int {
        let arr: Int64Array = cells
            .iter()
            .map(|v| match v {
                MetadataValue::Integer(i) => Some(*i),
                _ => None,
            })
            .collect();
        (DataType::Int64, Arc::new(arr))
    } else if any && all_num {
        let arr: Float64Array = cells.iter().map(|v| v.as_f64()).collect();
        (DataType::Float64, Arc::new(arr))
    } else if any && all_bool {
        let arr: BooleanArray = cells
            .iter()
            .map(|v| match v {
                MetadataValue::Bool(b) => Some(*b),
                _ => None,
            })
            .collect();
        (DataType::Boolean, Arc::new(arr))
    } else {
        let arr: StringArray = cells
            .iter()
            .map(|v| match v {
                MetadataValue::Null => None,
                other => Some(other.to_string()),
            })
            .collect();
        (DataType::Utf8, Arc::new(arr))
    }
}

fn write_parquet(path: &Path, records: &[SpectrumRecord]) -> Result<()> {
    let mut fields = vec![list_field("x"), list_field("y")];
    let mut columns = vec![
        list_array(records.iter().map(|r| &r.x)),
        list_array(records.iter().map(|r| &r.y)),
    ];
    for key in metadata_columns(records) {
        let (data_type, array) = metadata_array(records, &key);
        fields.push(Field::new(key, data_type, true));
        columns.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;

    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}
