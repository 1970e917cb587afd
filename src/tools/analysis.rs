//! 内置分析工具：纯计算，不访问数据存储
//!
//! - compare_metrics：A vs B 差值与百分比
//! - calculate_trends：最小二乘线性趋势
//! - aggregate_results：合并多个结果

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::{ArgType, Tool, ToolSchema};

/// 从结果中提取数值：数字 / 数字字符串 / 常见字段名 / 第一个数值字段
pub fn extract_numeric(value: &Value) -> Option<f64> {
    const NUMERIC_FIELDS: [&str; 6] = ["value", "amount", "total", "revenue", "count", "score"];
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => NUMERIC_FIELDS
            .iter()
            .find_map(|key| map.get(*key).and_then(extract_numeric))
            .or_else(|| map.values().find_map(Value::as_f64)),
        _ => None,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// compare_metrics：metric_a 相对 metric_b 的变化
pub struct CompareMetricsTool;

#[async_trait]
impl Tool for CompareMetricsTool {
    fn name(&self) -> &str {
        "compare_metrics"
    }

    fn description(&self) -> &str {
        "Compare two metrics (A vs B). Args: {\"metric_a\": number|object, \"metric_b\": number|object}"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new()
            .required("metric_a", ArgType::Any)
            .required("metric_b", ArgType::Any)
            .optional("label", ArgType::String)
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let a = extract_numeric(&args["metric_a"])
            .ok_or_else(|| "metric_a has no numeric value".to_string())?;
        let b = extract_numeric(&args["metric_b"])
            .ok_or_else(|| "metric_b has no numeric value".to_string())?;

        let delta = a - b;
        let delta_pct = if b != 0.0 { delta / b * 100.0 } else { 0.0 };
        let direction = if delta > 0.0 {
            "increase"
        } else if delta < 0.0 {
            "decrease"
        } else {
            "no_change"
        };
        let magnitude = match delta_pct.abs() {
            p if p > 20.0 => "significant",
            p if p > 5.0 => "moderate",
            _ => "minor",
        };

        Ok(json!({
            "metric_a": a,
            "metric_b": b,
            "delta": round2(delta),
            "delta_pct": round2(delta_pct),
            "direction": direction,
            "magnitude": magnitude,
        }))
    }
}

/// calculate_trends：data_points 为数字或对象数组（对象取 metric 字段，未指定时按 extract_numeric 规则取值）；
/// 任一点取不到数值即报错
pub struct CalculateTrendsTool;

#[async_trait]
impl Tool for CalculateTrendsTool {
    fn name(&self) -> &str {
        "calculate_trends"
    }

    fn description(&self) -> &str {
        "Calculate a linear trend. Args: {\"data_points\": [number|object], \"metric\": \"field for object points\"}"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new()
            .required("data_points", ArgType::Array)
            .optional("metric", ArgType::String)
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let metric = args["metric"].as_str();
        let items: &[Value] = args["data_points"].as_array().map(Vec::as_slice).unwrap_or(&[]);
        let points = items
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let value = match (p, metric) {
                    (Value::Object(map), Some(field)) => map.get(field).and_then(extract_numeric),
                    (other, _) => extract_numeric(other),
                };
                value.ok_or_else(|| format!("data point {i} has no numeric value: {p}"))
            })
            .collect::<Result<Vec<f64>, String>>()?;

        if points.len() < 2 {
            return Err("need at least 2 data points for trend analysis".to_string());
        }

        let n = points.len() as f64;
        let sum_x: f64 = (0..points.len()).map(|i| i as f64).sum();
        let sum_y: f64 = points.iter().sum();
        let sum_xy: f64 = points.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
        let sum_x2: f64 = (0..points.len()).map(|i| (i * i) as f64).sum();

        let slope = (n * sum_xy - sum_x * sum_y) / (n * sum_x2 - sum_x * sum_x);
        let intercept = (sum_y - slope * sum_x) / n;
        let trend = if slope > 0.0 {
            "increasing"
        } else if slope < 0.0 {
            "decreasing"
        } else {
            "flat"
        };
        let strength = match slope.abs() {
            s if s > 1.0 => "strong",
            s if s > 0.1 => "moderate",
            _ => "weak",
        };

        Ok(json!({
            "trend": trend,
            "slope": round2(slope),
            "intercept": round2(intercept),
            "data_points": points.len(),
            "strength": strength,
        }))
    }
}

/// aggregate_results：把所有参数值按参数名排序后合并
pub struct AggregateResultsTool;

#[async_trait]
impl Tool for AggregateResultsTool {
    fn name(&self) -> &str {
        "aggregate_results"
    }

    fn description(&self) -> &str {
        "Combine several results into one. Args: any named values, e.g. {\"a\": \"$step_1\", \"b\": \"$step_2\"}"
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let combined = args.as_object().cloned().unwrap_or_default();
        Ok(json!({
            "total_items": combined.len(),
            "combined": combined,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_numeric() {
        assert_eq!(extract_numeric(&json!(45000)), Some(45000.0));
        assert_eq!(extract_numeric(&json!("12.5")), Some(12.5));
        assert_eq!(extract_numeric(&json!({"revenue": 58500, "deals": 3})), Some(58500.0));
        assert_eq!(extract_numeric(&json!({"x": "a", "y": 2})), Some(2.0));
        assert_eq!(extract_numeric(&json!([1, 2])), None);
    }

    #[tokio::test]
    async fn test_compare_revenue_drop() {
        let out = CompareMetricsTool
            .execute(json!({"metric_a": 45000, "metric_b": 58500}))
            .await
            .unwrap();
        assert_eq!(out["delta"], json!(-13500.0));
        assert!((out["delta_pct"].as_f64().unwrap() - (-23.08)).abs() < 0.1);
        assert_eq!(out["direction"], "decrease");
        assert_eq!(out["magnitude"], "significant");
    }

    #[tokio::test]
    async fn test_compare_against_zero_baseline() {
        let out = CompareMetricsTool
            .execute(json!({"metric_a": 10, "metric_b": 0}))
            .await
            .unwrap();
        assert_eq!(out["delta_pct"], json!(0.0));
    }

    #[tokio::test]
    async fn test_trend_needs_two_points() {
        let err = CalculateTrendsTool
            .execute(json!({"data_points": [1]}))
            .await
            .unwrap_err();
        assert!(err.contains("at least 2"));
    }

    #[tokio::test]
    async fn test_increasing_trend() {
        let out = CalculateTrendsTool
            .execute(json!({"data_points": [{"value": 1}, {"value": 3}, {"value": 5}]}))
            .await
            .unwrap();
        assert_eq!(out["trend"], "increasing");
        assert_eq!(out["slope"], json!(2.0));
        assert_eq!(out["strength"], "strong");
    }

    #[tokio::test]
    async fn test_trend_rejects_point_missing_metric() {
        let err = CalculateTrendsTool
            .execute(json!({
                "data_points": [{"revenue": 10}, {"deals": 4}, {"revenue": 14}],
                "metric": "revenue"
            }))
            .await
            .unwrap_err();
        assert!(err.contains("data point 1"));
    }

    #[tokio::test]
    async fn test_trend_rejects_non_numeric_point() {
        let err = CalculateTrendsTool
            .execute(json!({"data_points": [5, "n/a", 7]}))
            .await
            .unwrap_err();
        assert!(err.contains("data point 1"));
    }

    #[tokio::test]
    async fn test_trend_reads_revenue_objects_without_metric() {
        let out = CalculateTrendsTool
            .execute(json!({"data_points": [{"revenue": 100}, {"revenue": 90}, {"revenue": 80}]}))
            .await
            .unwrap();
        assert_eq!(out["trend"], "decreasing");
        assert_eq!(out["slope"], json!(-10.0));
    }

    #[tokio::test]
    async fn test_aggregate() {
        let out = AggregateResultsTool
            .execute(json!({"a": 1, "b": {"x": 2}}))
            .await
            .unwrap();
        assert_eq!(out["total_items"], 2);
        assert_eq!(out["combined"]["b"]["x"], 2);
    }
}
