//! 拆解提示词与计划 JSON Schema（schemars 自动生成，拼入提示词以减少格式错误）

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};

use crate::chain::types::Query;

/// 计划格式（仅用于 Schema 生成，与 ChainPlan 的线上格式一致）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct PlanFormat {
    /// "sequential" | "parallel" | "conditional"
    pub chain_type: String,
    /// 选择该链类型的简要理由
    pub reasoning: Option<String>,
    pub steps: Vec<StepFormat>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct StepFormat {
    /// 从 1 开始，严格递增
    pub step_number: u32,
    pub question: String,
    pub tool_to_use: String,
    /// 字面量，或 "$step_N" / "$step_N.field" 引用前序步骤输出
    pub tool_args: HashMap<String, serde_json::Value>,
    /// 只能包含编号更小的步骤
    pub depends_on: Vec<u32>,
    /// 仅 conditional 链使用，挂在 predicate_on 步骤上
    pub branch: Option<BranchFormat>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct BranchFormat {
    pub predicate_on: u32,
    /// {"op": "greater_than" | "less_than" | "equals" | "field_greater_than" | "field_less_than" | "is_true", ...}
    pub predicate: serde_json::Value,
    pub on_true: Vec<u32>,
    pub on_false: Vec<u32>,
}

/// 计划格式的 JSON Schema 字符串
pub fn plan_schema_json() -> String {
    let schema = schema_for!(PlanFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

const PLAN_EXAMPLE: &str = r#"{
  "chain_type": "sequential",
  "reasoning": "Need both periods before comparing them",
  "steps": [
    {"step_number": 1, "question": "What is the current revenue?", "tool_to_use": "get_revenue_data", "tool_args": {"period": "current_month"}, "depends_on": []},
    {"step_number": 2, "question": "What was last month's revenue?", "tool_to_use": "get_revenue_data", "tool_args": {"period": "last_month"}, "depends_on": []},
    {"step_number": 3, "question": "How did revenue change?", "tool_to_use": "compare_metrics", "tool_args": {"metric_a": "$step_1", "metric_b": "$step_2"}, "depends_on": [1, 2]}
  ]
}"#;

const CONDITIONAL_EXAMPLE: &str = r#"{"step_number": 1, "question": "Did red zone clients increase?", "tool_to_use": "get_health_scores", "tool_args": {}, "depends_on": [],
 "branch": {"predicate_on": 1, "predicate": {"op": "field_greater_than", "left": "current", "right": "previous"}, "on_true": [2], "on_false": [3]}}"#;

pub const SYSTEM_PROMPT: &str =
    "You are a query decomposition expert. Reply with a single JSON object and nothing else.";

/// 构建拆解提示词
pub fn decomposition_prompt(query: &Query, tools: &[(String, String)]) -> String {
    let tool_list = tools
        .iter()
        .map(|(name, desc)| format!("- {name}: {desc}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Break down this business question into a logical sequence of sub-steps.

ORIGINAL QUERY: "{query}"

CONTEXT: {context}

AVAILABLE TOOLS:
{tool_list}

TASK:
1. Choose the reasoning chain type:
   - "sequential": each step may use earlier results (A→B→C)
   - "parallel": steps run independently, dependencies only where declared
   - "conditional": branch on a result (if A then B else C)
2. Break the query into 1-7 steps, each with a sub-question, a tool, its arguments and the steps it depends on.
3. Reference an earlier step's output as "$step_N" or "$step_N.field"; every referenced step must appear in depends_on.

OUTPUT FORMAT (JSON Schema):
{schema}

EXAMPLE:
{example}

CONDITIONAL STEP EXAMPLE:
{conditional}

NOW DECOMPOSE THIS QUERY:"#,
        query = query.text,
        context = query.context.as_deref().unwrap_or("None provided"),
        schema = plan_schema_json(),
        example = PLAN_EXAMPLE,
        conditional = CONDITIONAL_EXAMPLE,
    )
}

/// 从回复中提取 JSON：优先 ```json 代码块，否则取最外层 {...}
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), Some("{\"a\":1}"));
        assert_eq!(extract_json("Here is the plan: {\"a\": {\"b\": 2}} done"), Some("{\"a\": {\"b\": 2}}"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_prompt_lists_tools_and_context() {
        let query = Query::new("Why is revenue down?").with_context("Q3");
        let tools = vec![("get_revenue_data".to_string(), "Revenue by period".to_string())];
        let prompt = decomposition_prompt(&query, &tools);
        assert!(prompt.contains("- get_revenue_data: Revenue by period"));
        assert!(prompt.contains("CONTEXT: Q3"));
        assert!(prompt.contains("\"Why is revenue down?\""));
        assert!(prompt.contains("tool_to_use"));
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = plan_schema_json();
        assert!(schema.contains("chain_type"));
        assert!(schema.contains("depends_on"));
    }
}
