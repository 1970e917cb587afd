//! Planner：把查询拆解为 ChainPlan
//!
//! - **LlmPlanner**：调用 LLM 获得 JSON 计划并解析；可选单步兜底
//! - **StaticPlanner**：返回预置计划（测试、演示）
//!
//! 规划结果由编排器统一校验（validate_plan），规划器本身不做修补。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::chain::types::{ChainPlan, ChainType, Query, StepSpec};
use crate::core::ChainError;
use crate::llm::{LlmClient, Message};
use crate::planning::prompt::{decomposition_prompt, extract_json, SYSTEM_PROMPT};

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, query: &Query) -> Result<ChainPlan, ChainError>;
}

/// 预置计划规划器
pub struct StaticPlanner {
    plan: ChainPlan,
}

impl StaticPlanner {
    pub fn new(plan: ChainPlan) -> Self {
        Self { plan }
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn plan(&self, _query: &Query) -> Result<ChainPlan, ChainError> {
        Ok(self.plan.clone())
    }
}

/// LLM 规划器：持有 LLM 与可用工具列表（名称, 描述）
pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
    tools: Vec<(String, String)>,
    fallback_tool: Option<String>,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Vec<(String, String)>) -> Self {
        Self {
            llm,
            tools,
            fallback_tool: None,
        }
    }

    /// 规划能力出错或回复中没有可解析 JSON 时，退化为调用该工具的单步计划
    pub fn with_fallback_tool(mut self, tool: Option<String>) -> Self {
        self.fallback_tool = tool;
        self
    }

    fn fallback_or(&self, query: &Query, reason: String) -> Result<ChainPlan, ChainError> {
        match &self.fallback_tool {
            Some(tool) => {
                tracing::warn!(%reason, fallback_tool = %tool, "planning failed, using fallback plan");
                Ok(fallback_plan(query, tool))
            }
            None => Err(ChainError::Planning(reason)),
        }
    }
}

/// 单步顺序计划：以原始查询为问题调用兜底工具
pub fn fallback_plan(query: &Query, tool: &str) -> ChainPlan {
    ChainPlan {
        chain_type: ChainType::Sequential,
        reasoning: Some("planning unavailable, answering with a single tool call".to_string()),
        steps: vec![StepSpec {
            step_number: 1,
            question: query.text.clone(),
            tool_name: tool.to_string(),
            tool_args: Default::default(),
            depends_on: Default::default(),
            branch: None,
        }],
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, query: &Query) -> Result<ChainPlan, ChainError> {
        let messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(decomposition_prompt(query, &self.tools)),
        ];

        let reply = match self.llm.complete(&messages).await {
            Ok(reply) => reply,
            Err(e) => return self.fallback_or(query, format!("planning capability failed: {e}")),
        };

        let Some(json) = extract_json(&reply) else {
            return self.fallback_or(query, "no JSON plan in planning response".to_string());
        };
        let value: Value = match serde_json::from_str(json) {
            Ok(value) => value,
            Err(e) => return self.fallback_or(query, format!("unparseable plan JSON: {e}")),
        };

        let plan: ChainPlan = serde_json::from_value(value)
            .map_err(|e| ChainError::Planning(format!("malformed plan: {e}")))?;

        tracing::info!(
            chain_type = %plan.chain_type,
            steps = plan.steps.len(),
            llm = self.llm.name(),
            "query decomposed"
        );
        Ok(plan)
    }
}
