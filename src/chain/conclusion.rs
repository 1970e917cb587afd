//! 单步结论：按工具输出形状生成一句确定性摘要
//!
//! 格式：`Step N: <question> → <summary>`

use serde_json::Value;

use crate::chain::types::StepSpec;

fn fmt_number(n: f64) -> String {
    format!("{n:.2}")
}

fn summarize_field(key: &str, value: &Value) -> String {
    match value {
        Value::Number(n) => format!("{key}: {}", fmt_number(n.as_f64().unwrap_or_default())),
        Value::Array(items) => format!("{key}: {} items", items.len()),
        Value::Object(_) => format!("{key}: [object]"),
        Value::String(s) => format!("{key}: {s}"),
        Value::Bool(b) => format!("{key}: {b}"),
        Value::Null => format!("{key}: null"),
    }
}

/// 输出摘要（不含步骤前缀）
pub fn summarize(result: &Value) -> String {
    match result {
        Value::Object(map) => {
            let number = |k: &str| map.get(k).and_then(Value::as_f64);
            if let (Some(delta), Some(pct)) = (number("delta"), number("delta_pct")) {
                let sides = match (number("metric_a"), number("metric_b")) {
                    (Some(a), Some(b)) => format!("{} vs {} → ", fmt_number(a), fmt_number(b)),
                    _ => String::new(),
                };
                return format!("{sides}{} ({:+.2}%)", fmt_number(delta), pct);
            }
            if let (Some(trend), Some(slope)) = (map.get("trend").and_then(Value::as_str), number("slope")) {
                return format!("trend {trend} (slope {})", fmt_number(slope));
            }
            if map.is_empty() {
                return "empty result".to_string();
            }
            map.iter()
                .take(3)
                .map(|(k, v)| summarize_field(k, v))
                .collect::<Vec<_>>()
                .join(", ")
        }
        Value::Number(n) => format!("value: {}", fmt_number(n.as_f64().unwrap_or_default())),
        Value::Array(items) => format!("{} items", items.len()),
        other => {
            let s = other.to_string();
            s.chars().take(100).collect()
        }
    }
}

pub fn conclude(spec: &StepSpec, result: &Value) -> String {
    format!(
        "Step {}: {} → {}",
        spec.step_number,
        spec.question,
        summarize(result)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_comparison_shape() {
        let out = summarize(&json!({
            "metric_a": 45000.0, "metric_b": 58500.0, "delta": -13500.0, "delta_pct": -23.08
        }));
        assert_eq!(out, "45000.00 vs 58500.00 → -13500.00 (-23.08%)");
    }

    #[test]
    fn test_trend_shape() {
        assert_eq!(
            summarize(&json!({"trend": "increasing", "slope": 2.0})),
            "trend increasing (slope 2.00)"
        );
    }

    #[test]
    fn test_generic_object_takes_first_three_fields() {
        let out = summarize(&json!({"a": 1, "b": [1, 2], "c": {"x": 1}, "d": "ignored"}));
        assert_eq!(out, "a: 1.00, b: 2 items, c: [object]");
    }

    #[test]
    fn test_scalar_shapes() {
        assert_eq!(summarize(&json!(45000)), "value: 45000.00");
        assert_eq!(summarize(&json!([1, 2, 3])), "3 items");
        assert_eq!(summarize(&json!("flat")), "\"flat\"");
    }
}
