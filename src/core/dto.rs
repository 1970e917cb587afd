//! 请求 / 响应线上格式
//!
//! - full：完整 trace + 最终答案 + 执行汇总
//! - compact：只有答案，永不包含 steps 字段
//! - failure：`{success: false, error}`，仅用于执行前的规划失败

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chain::types::{
    ArgValue, ChainRun, ChainType, ExecutionSummary, Query, ResponseMode, StepNumber, StepStatus,
};
use crate::core::ErrorKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub mode: ResponseMode,
}

impl ReasoningRequest {
    pub fn into_query(self) -> Query {
        Query {
            text: self.query,
            context: self.context.filter(|c| !c.trim().is_empty()),
            mode: self.mode,
        }
    }
}

/// 单步 trace
#[derive(Debug, Clone, Serialize)]
pub struct StepTrace {
    pub step_number: StepNumber,
    pub question: String,
    pub tool_to_use: String,
    pub tool_args: BTreeMap<String, ArgValue>,
    pub result: Option<Value>,
    pub conclusion: Option<String>,
    pub execution_time_ms: Option<u64>,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullResponse {
    pub success: bool,
    pub query: String,
    pub chain_type: ChainType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub steps: Vec<StepTrace>,
    pub final_answer: String,
    pub execution_summary: ExecutionSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompactResponse {
    pub success: bool,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureResponse {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReasoningResponse {
    Full(FullResponse),
    Compact(CompactResponse),
    Failure(FailureResponse),
}

impl ReasoningResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure(FailureResponse {
            success: false,
            error: error.into(),
        })
    }

    /// 按查询的 mode 组装响应；中止的链 success 为 false 并带 error
    pub fn from_run(run: &ChainRun) -> Self {
        let success = !run.is_aborted();
        let error = run.abort_reason.clone();

        match run.query.mode {
            ResponseMode::Compact => Self::Compact(CompactResponse {
                success,
                answer: run.final_answer.clone(),
                error,
            }),
            ResponseMode::Full => {
                let steps = run
                    .plan
                    .steps
                    .iter()
                    .zip(&run.results)
                    .map(|(spec, result)| StepTrace {
                        step_number: spec.step_number,
                        question: spec.question.clone(),
                        tool_to_use: spec.tool_name.clone(),
                        tool_args: spec.tool_args.clone(),
                        result: result.result.clone(),
                        conclusion: result.conclusion.clone(),
                        execution_time_ms: result.execution_time_ms,
                        status: result.status,
                        error: result.error.clone(),
                        skip_reason: result.skip_reason.clone(),
                    })
                    .collect();

                Self::Full(FullResponse {
                    success,
                    query: run.query.text.clone(),
                    chain_type: run.plan.chain_type,
                    reasoning: run.plan.reasoning.clone(),
                    steps,
                    final_answer: run.final_answer.clone(),
                    execution_summary: run.summary,
                    issues: run.issues.clone(),
                    error,
                })
            }
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            Self::Full(r) => r.success,
            Self::Compact(r) => r.success,
            Self::Failure(_) => false,
        }
    }
}
