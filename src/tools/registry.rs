//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / schema / execute），由 ToolRegistry 按名注册与解析，
//! 解析结果 ToolHandle 在调用时先校验参数、再加超时执行，并统一转为 ErrorKind。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::ErrorKind;
use crate::tools::executor::ToolHandle;
use crate::tools::schema::ToolSchema;

/// 工具 trait：名称、描述（供规划器理解）、参数 schema、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（对应计划中的 "tool_to_use" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供规划器理解功能）
    fn description(&self) -> &str;

    /// 参数 schema；默认不限制参数
    fn schema(&self) -> ToolSchema {
        ToolSchema::default()
    }

    /// 执行工具；Err 为工具自身报告的失败信息
    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>；BTreeMap 保证 prompt 中的工具顺序稳定
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool re-registered, previous definition replaced");
        }
    }

    /// 按名解析；未注册返回 ToolNotFound
    pub fn resolve(&self, name: &str) -> Result<ToolHandle, ErrorKind> {
        self.tools
            .get(name)
            .cloned()
            .map(ToolHandle::new)
            .ok_or_else(|| ErrorKind::ToolNotFound {
                tool: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 返回 (name, description) 列表，用于生成规划 prompt 中的 Available tools 段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.tools
            .iter()
            .map(|(name, tool)| (name.clone(), tool.description().to_string()))
            .collect()
    }

    /// 动态生成工具 schema JSON（与实际注册工具一致）
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|(name, tool)| {
                serde_json::json!({
                    "name": name,
                    "description": tool.description(),
                    "parameters": tool.schema().to_json()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}
