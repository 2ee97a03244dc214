use std::path::Path;

use serde_json::{Map, Number, Value};

use crate::errors::StageError;

/// One row of financial history, keyed by column name.
pub type FinancialRecord = Map<String, Value>;

pub trait FinancialRecordSource: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<FinancialRecord>, StageError>;
}

/// Reads `.json` (array of objects) and `.csv` (header row) exports.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileRecordSource;

impl FinancialRecordSource for FileRecordSource {
    fn load(&self, path: &Path) -> Result<Vec<FinancialRecord>, StageError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "json" | "csv" => {}
            "xlsx" | "xls" | "ods" => {
                return Err(StageError::Data(format!(
                    "spreadsheet `{}` is not readable directly; export it to CSV first",
                    path.display()
                )))
            }
            other => {
                return Err(StageError::Data(format!(
                    "unsupported financial source extension `{other}` for `{}`",
                    path.display()
                )))
            }
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            StageError::Data(format!("failed to read `{}`: {error}", path.display()))
        })?;

        if extension == "json" {
            parse_json_records(&raw)
        } else {
            parse_csv_records(&raw)
        }
    }
}

pub fn parse_json_records(raw: &str) -> Result<Vec<FinancialRecord>, StageError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|error| StageError::Data(format!("malformed JSON financial records: {error}")))?;

    let Value::Array(rows) = value else {
        return Err(StageError::Data("financial records must be a JSON array".to_owned()));
    };

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| match row {
            Value::Object(record) => Ok(record),
            _ => Err(StageError::Data(format!("financial record {index} is not an object"))),
        })
        .collect()
}

pub fn parse_csv_records(raw: &str) -> Result<Vec<FinancialRecord>, StageError> {
    let mut rows = split_csv_rows(raw)?.into_iter();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let header: Vec<String> = header.into_iter().map(|name| name.trim().to_owned()).collect();
    if header.iter().any(String::is_empty) {
        return Err(StageError::Data("CSV header contains an empty column name".to_owned()));
    }

    let mut records = Vec::new();
    for (index, row) in rows.enumerate() {
        if row.len() == 1 && row[0].trim().is_empty() {
            continue;
        }
        if row.len() != header.len() {
            return Err(StageError::Data(format!(
                "CSV row {} has {} cells, expected {}",
                index + 2,
                row.len(),
                header.len()
            )));
        }
        let record = header
            .iter()
            .cloned()
            .zip(row.into_iter().map(|cell| cell_value(&cell)))
            .collect::<FinancialRecord>();
        records.push(record);
    }

    Ok(records)
}

fn cell_value(cell: &str) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Value::Number(integer.into());
    }
    if let Some(number) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }
    Value::String(trimmed.to_owned())
}

fn split_csv_rows(raw: &str) -> Result<Vec<Vec<String>>, StageError> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = raw.trim_start_matches('\u{feff}').chars().peekable();

    while let Some(ch) = chars.next() {
        match (quoted, ch) {
            (true, '"') if chars.peek() == Some(&'"') => {
                chars.next();
                cell.push('"');
            }
            (true, '"') => quoted = false,
            (true, other) => cell.push(other),
            (false, '"') if cell.is_empty() => quoted = true,
            (false, ',') => row.push(std::mem::take(&mut cell)),
            (false, '\r') => {}
            (false, '\n') => {
                row.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut row));
            }
            (false, other) => cell.push(other),
        }
    }

    if quoted {
        return Err(StageError::Data("CSV ends inside a quoted cell".to_owned()));
    }
    if !cell.is_empty() || !row.is_empty() {
        row.push(cell);
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::{parse_csv_records, FileRecordSource, FinancialRecordSource};
    use crate::errors::StageError;

    #[test]
    fn csv_rows_become_records_with_numeric_cells() {
        let records = parse_csv_records(
            "month,income,expenses,note\n2025-01,5200,3100.50,\"rent, utilities\"\n2025-02,5200,2980,\n",
        )
        .expect("csv parses");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["income"], json!(5200));
        assert_eq!(records[0]["expenses"], json!(3100.5));
        assert_eq!(records[0]["note"], json!("rent, utilities"));
        assert_eq!(records[1]["note"], json!(null));
    }

    #[test]
    fn csv_escaped_quotes_are_unescaped() {
        let records = parse_csv_records("label\n\"the \"\"big\"\" one\"\n").expect("csv parses");
        assert_eq!(records[0]["label"], json!("the \"big\" one"));
    }

    #[test]
    fn ragged_csv_row_is_a_data_error() {
        let error = parse_csv_records("a,b\n1\n").expect_err("ragged row rejected");
        assert!(matches!(error, StageError::Data(detail) if detail.contains("row 2")));
    }

    #[test]
    fn json_file_loads_array_of_objects() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().expect("temp file");
        write!(file, r#"[{{"month":"2025-03","income":4800}}]"#).expect("write");

        let records = FileRecordSource.load(file.path()).expect("json loads");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["income"], json!(4800));
    }

    #[test]
    fn json_scalar_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().expect("temp file");
        write!(file, "42").expect("write");

        let error = FileRecordSource.load(file.path()).expect_err("scalar rejected");
        assert_eq!(error.kind(), crate::errors::ErrorKind::Data);
    }

    #[test]
    fn spreadsheet_and_missing_files_are_data_errors() {
        let spreadsheet = FileRecordSource
            .load(std::path::Path::new("finances.xlsx"))
            .expect_err("xlsx unsupported");
        assert!(spreadsheet.detail().contains("export it to CSV"));

        let missing = FileRecordSource
            .load(std::path::Path::new("/nonexistent/dealwatch/finances.csv"))
            .expect_err("missing file");
        assert!(matches!(missing, StageError::Data(_)));
    }
}
