use serde_json::Value;

/// Print just the key answer.
///
/// An allocation prints as `TICKER=weight` pairs; other results print the
/// first well-known figure, then fall back to the first field.
pub fn print_minimal(value: &Value) {
    println!("{}", minimal_line(value));
}

fn minimal_line(value: &Value) -> String {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let priority_keys = [
        "sharpe_ratio",
        "volatility",
        "expected_return",
        "observations",
    ];

    if let Value::Object(map) = result_obj {
        if let Some(Value::Array(weights)) = map.get("weights") {
            let pairs: Vec<String> = weights
                .iter()
                .filter_map(|w| {
                    let ticker = w.get("ticker")?.as_str()?;
                    let weight = w.get("weight")?.as_f64()?;
                    Some(format!("{}={:.4}", ticker, weight))
                })
                .collect();
            if !pairs.is_empty() {
                return pairs.join(" ");
            }
        }

        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    return format_minimal(val);
                }
            }
        }

        if let Some((key, val)) = map.iter().next() {
            return format!("{}: {}", key, format_minimal(val));
        }
    }

    format_minimal(result_obj)
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
