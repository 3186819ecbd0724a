use serde_json::{Map, Value};
use std::io;

/// Result fields that hold the per-asset rows, in order of preference.
const RECORD_KEYS: [&str; 2] = ["weights", "assets"];

/// Write output as CSV to stdout.
///
/// Optimisation results become one row per asset; anything else falls back
/// to two-column field/value rows.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match value {
        Value::Object(map) => {
            let target = match map.get("result") {
                Some(Value::Object(result)) => result,
                _ => map,
            };
            match primary_records(target) {
                Some(records) => write_array_csv(&mut wtr, records),
                None => write_fields_csv(&mut wtr, target),
            }
        }
        Value::Array(arr) => write_array_csv(&mut wtr, arr),
        _ => {
            let _ = wtr.write_record([&format_csv_value(value)]);
        }
    }

    let _ = wtr.flush();
}

fn primary_records(map: &Map<String, Value>) -> Option<&[Value]> {
    RECORD_KEYS.iter().find_map(|key| match map.get(*key) {
        Some(Value::Array(arr)) if arr.iter().all(Value::is_object) => Some(arr.as_slice()),
        _ => None,
    })
}

fn write_fields_csv(wtr: &mut csv::Writer<io::StdoutLock<'_>>, map: &Map<String, Value>) {
    let _ = wtr.write_record(["field", "value"]);
    for (key, val) in map {
        let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
    }
}

fn write_array_csv(wtr: &mut csv::Writer<io::StdoutLock<'_>>, arr: &[Value]) {
    if arr.is_empty() {
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
        let _ = wtr.write_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default())
                    .collect();
                let _ = wtr.write_record(&row);
            }
        }
    } else {
        for item in arr {
            let _ = wtr.write_record([&format_csv_value(item)]);
        }
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_weights_preferred_over_fields() {
        let result = json!({
            "expected_return": 0.12,
            "weights": [{"ticker": "A", "weight": 1.0}],
        });
        let records = primary_records(result.as_object().unwrap()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_no_records_falls_back() {
        let result = json!({"observations": 10});
        assert!(primary_records(result.as_object().unwrap()).is_none());
    }
}
