use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Format output as tables using the tabled crate.
///
/// Scalar fields of the result go into one Field/Value table; nested
/// objects and lists of records (weights, frontier points, sector
/// allocation) each get their own titled table.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_section(None, result);
                print_envelope_notes(map);
            } else {
                print_section(None, value);
            }
        }
        Value::Array(arr) => print_records(None, arr),
        _ => println!("{}", value),
    }
}

fn print_section(title: Option<&str>, value: &Value) {
    match value {
        Value::Object(map) => {
            let scalars: Vec<(&String, &Value)> = map.iter().filter(|(_, v)| is_flat(v)).collect();
            if !scalars.is_empty() {
                print_title(title);
                let mut builder = Builder::default();
                builder.push_record(["Field", "Value"]);
                for (key, val) in scalars {
                    builder.push_record([key.as_str(), &format_value(val)]);
                }
                println!("{}", Table::from(builder));
            }
            for (key, val) in map.iter().filter(|(_, v)| !is_flat(v)) {
                let child = match title {
                    Some(t) => format!("{}.{}", t, key),
                    None => key.clone(),
                };
                print_section(Some(&child), val);
            }
        }
        Value::Array(arr) => print_records(title, arr),
        _ => {
            print_title(title);
            println!("{}", format_value(value));
        }
    }
}

/// A list of objects as one row per object. Nested columns are left out.
fn print_records(title: Option<&str>, arr: &[Value]) {
    print_title(title);
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first
            .iter()
            .filter(|(_, v)| is_flat(v))
            .map(|(k, _)| k.clone())
            .collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);
        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }
        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn print_envelope_notes(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }
    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_title(title: Option<&str>) {
    if let Some(t) = title {
        println!("\n{}:", t);
    }
}

/// Scalars and lists of scalars fit in a single cell.
fn is_flat(value: &Value) -> bool {
    match value {
        Value::Object(_) => false,
        Value::Array(arr) => arr.iter().all(|v| !v.is_object() && !v.is_array()),
        _ => true,
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) => format!("{:.6}", f),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatness() {
        assert!(is_flat(&json!(0.25)));
        assert!(is_flat(&json!([0.1, 0.2])));
        assert!(!is_flat(&json!({"Tech": 0.5})));
        assert!(!is_flat(&json!([{"ticker": "A"}])));
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_value(&json!(249)), "249");
        assert_eq!(format_value(&json!(0.123456789)), "0.123457");
        assert_eq!(format_value(&Value::Null), "-");
    }
}
