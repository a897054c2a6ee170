use serde_json::Value;
use std::fmt::Write as _;

/// Render a JSON document as human-readable text blocks, one per record.
///
/// - array: one record per element
/// - flat object (only scalar values): a single record
/// - nested object: one record per top-level key
/// - scalar: a single record
pub(crate) fn records(value: &Value) -> Vec<String> {
    let blocks = match value {
        Value::Array(items) => items.iter().map(|v| render_block(v)).collect(),
        Value::Object(map) if map.values().all(is_scalar) => vec![render_block(value)],
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let mut out = String::new();
                render_field(&mut out, k, v, 0);
                out
            })
            .collect(),
        scalar => vec![scalar_text(scalar)],
    };
    blocks.into_iter().map(|b| b.trim_end().to_string()).filter(|b| !b.trim().is_empty()).collect()
}

fn render_block(value: &Value) -> String {
    let mut out = String::new();
    render(&mut out, value, 0);
    out
}

fn is_scalar(v: &Value) -> bool {
    !matches!(v, Value::Array(_) | Value::Object(_))
}

fn is_empty_container(v: &Value) -> bool {
    match v {
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render(out: &mut String, value: &Value, depth: usize) {
    let pad = "  ".repeat(depth);
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                render_field(out, k, v, depth);
            }
        }
        Value::Array(items) => {
            for item in items {
                if is_scalar(item) {
                    let _ = writeln!(out, "{pad}- {}", scalar_text(item));
                } else {
                    let _ = writeln!(out, "{pad}-");
                    render(out, item, depth + 1);
                }
            }
        }
        scalar => {
            let _ = writeln!(out, "{pad}{}", scalar_text(scalar));
        }
    }
}

fn render_field(out: &mut String, key: &str, value: &Value, depth: usize) {
    let pad = "  ".repeat(depth);
    if is_scalar(value) {
        let _ = writeln!(out, "{pad}{key}: {}", scalar_text(value));
    } else if is_empty_container(value) {
        let _ = writeln!(out, "{pad}{key}: {value}");
    } else {
        let _ = writeln!(out, "{pad}{key}:");
        render(out, value, depth + 1);
    }
}
