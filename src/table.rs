use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::domain::{Record, RecordSet};

pub const NO_SAMPLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
    Mixed,
    Empty,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
            ColumnType::Mixed => "mixed",
            ColumnType::Empty => "empty",
        };
        write!(f, "{label}")
    }
}

impl ColumnType {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Boolean),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(ColumnType::Integer),
            Value::Number(_) => Some(ColumnType::Float),
            Value::String(_) => Some(ColumnType::Text),
            Value::Array(_) | Value::Object(_) => Some(ColumnType::Mixed),
        }
    }

    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (ColumnType::Empty, next) => next,
            (a, b) if a == b => a,
            (ColumnType::Integer, ColumnType::Float) | (ColumnType::Float, ColumnType::Integer) => {
                ColumnType::Float
            }
            _ => ColumnType::Mixed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnStats {
    pub name: String,
    pub non_null: usize,
    pub null: usize,
    pub kind: ColumnType,
    pub sample: String,
}

/// Renders a cell for display. Null and missing cells are blank.
pub fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Rows where any cell contains `needle`, ignoring case. A blank needle keeps
/// every row.
pub fn filter_rows<'a>(set: &'a RecordSet, needle: &str) -> Vec<&'a Record> {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return set.records().iter().collect();
    }
    set.records()
        .iter()
        .filter(|record| {
            set.columns().iter().any(|column| {
                display_value(record.get(column))
                    .to_lowercase()
                    .contains(&needle)
            })
        })
        .collect()
}

pub fn column_stats(set: &RecordSet) -> Vec<ColumnStats> {
    set.columns()
        .iter()
        .map(|column| {
            let mut non_null = 0usize;
            let mut kind = ColumnType::Empty;
            let mut sample: Option<String> = None;
            for record in set.records() {
                let Some(cell_kind) = record.get(column).and_then(ColumnType::of) else {
                    continue;
                };
                non_null += 1;
                kind = kind.merge(cell_kind);
                if sample.is_none() {
                    sample = Some(display_value(record.get(column)));
                }
            }
            ColumnStats {
                name: column.clone(),
                non_null,
                null: set.len() - non_null,
                kind,
                sample: sample.unwrap_or_else(|| NO_SAMPLE.to_string()),
            }
        })
        .collect()
}

/// Human-readable byte size (`12.3 KB`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_set() -> RecordSet {
        let records = vec![
            json!({"name": "Parc Lafontaine", "area": 34, "open": true, "note": null}),
            json!({"name": "Mont Royal", "area": 200.5, "open": true, "note": null}),
            json!({"name": "Jarry", "area": 36, "open": "yes", "note": null}),
        ]
        .into_iter()
        .map(|value| value.as_object().cloned().unwrap())
        .collect();
        RecordSet::new(records, &[])
    }

    #[test]
    fn filter_is_case_insensitive_across_columns() {
        let set = sample_set();
        assert_eq!(filter_rows(&set, "ROYAL").len(), 1);
        assert_eq!(filter_rows(&set, "36").len(), 1);
        assert_eq!(filter_rows(&set, "  ").len(), 3);
        assert!(filter_rows(&set, "verdun").is_empty());
    }

    #[test]
    fn stats_infer_types_and_samples() {
        let stats = column_stats(&sample_set());
        let by_name = |name: &str| stats.iter().find(|s| s.name == name).unwrap();

        assert_eq!(by_name("name").kind, ColumnType::Text);
        assert_eq!(by_name("name").sample, "Parc Lafontaine");
        assert_eq!(by_name("area").kind, ColumnType::Float);
        assert_eq!(by_name("open").kind, ColumnType::Mixed);

        let note = by_name("note");
        assert_eq!(note.kind, ColumnType::Empty);
        assert_eq!(note.non_null, 0);
        assert_eq!(note.null, 3);
        assert_eq!(note.sample, NO_SAMPLE);
    }

    #[test]
    fn missing_cells_count_as_null() {
        let records = vec![
            json!({"a": 1, "b": 2}).as_object().cloned().unwrap(),
            json!({"a": 3}).as_object().cloned().unwrap(),
        ];
        let stats = column_stats(&RecordSet::new(records, &[]));
        assert_eq!(stats[1].name, "b");
        assert_eq!(stats[1].non_null, 1);
        assert_eq!(stats[1].null, 1);
        assert_eq!(stats[0].kind, ColumnType::Integer);
    }

    #[test]
    fn byte_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
