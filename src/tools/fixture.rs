//! 静态数据工具：由配置 [tools.fixtures.<name>] 声明
//!
//! 在没有真实数据访问层时充当外部数据工具（演示 / 联调）。若配置了 key_arg，按该参数取值在 results 中查找；
//! 找不到时回退到 result，仍没有则报错。

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{FixtureSection, ToolsSection};
use crate::tools::{Tool, ToolRegistry};

pub struct FixtureTool {
    name: String,
    description: String,
    key_arg: Option<String>,
    results: HashMap<String, Value>,
    default_result: Option<Value>,
}

impl FixtureTool {
    pub fn from_config(name: impl Into<String>, section: &FixtureSection) -> Self {
        Self {
            name: name.into(),
            description: section.description.clone(),
            key_arg: section.key_arg.clone(),
            results: section.results.clone(),
            default_result: section.result.clone(),
        }
    }

    /// 固定返回同一个值
    pub fn constant(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            key_arg: None,
            results: HashMap::new(),
            default_result: Some(value),
        }
    }
}

#[async_trait]
impl Tool for FixtureTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let keyed = self
            .key_arg
            .as_deref()
            .and_then(|key| args.get(key))
            .and_then(Value::as_str)
            .and_then(|k| self.results.get(k));

        keyed
            .or(self.default_result.as_ref())
            .cloned()
            .ok_or_else(|| format!("no fixture data for args {args}"))
    }
}

/// 将配置中的所有 fixture 注册进 registry
pub fn register_fixtures(registry: &mut ToolRegistry, tools: &ToolsSection) {
    for (name, section) in &tools.fixtures {
        registry.register(FixtureTool::from_config(name.clone(), section));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn revenue_fixture() -> FixtureTool {
        let section = FixtureSection {
            description: "revenue".to_string(),
            key_arg: Some("period".to_string()),
            results: HashMap::from([
                ("current_month".to_string(), json!({"revenue": 45000})),
                ("last_month".to_string(), json!({"revenue": 58500})),
            ]),
            result: None,
        };
        FixtureTool::from_config("get_revenue_data", &section)
    }

    #[tokio::test]
    async fn test_keyed_lookup() {
        let tool = revenue_fixture();
        let out = tool.execute(json!({"period": "last_month"})).await.unwrap();
        assert_eq!(out["revenue"], 58500);
    }

    #[tokio::test]
    async fn test_unknown_key_without_default_fails() {
        let tool = revenue_fixture();
        assert!(tool.execute(json!({"period": "q3"})).await.is_err());
    }

    #[tokio::test]
    async fn test_constant() {
        let tool = FixtureTool::constant("n", json!(3));
        assert_eq!(tool.execute(json!({})).await.unwrap(), json!(3));
    }
}
