//! 推理链错误类型
//!
//! 两层错误：
//! - **ErrorKind**：步骤局部错误，记录在 StepResult / ChainRun 中，永不向上抛出
//! - **ChainError**：逃逸到调用方的错误（规划失败、整链超时、取消、配置）

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 步骤局部错误（可序列化，随 trace 一起返回给调用方）
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("Tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("Argument binding failed: {reason}")]
    ArgumentBinding { reason: String },

    #[error("Tool {tool} failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// scope 为 "step" 或 "chain"
    #[error("Timeout ({scope}) after {after_ms}ms")]
    Timeout { scope: String, after_ms: u64 },

    /// 调用方取消（如客户端断开），运行中的步骤被中断
    #[error("Cancelled by caller after {after_ms}ms")]
    Cancelled { after_ms: u64 },

    /// 条件步骤未完成，两个分支均被跳过
    #[error("Condition on step {predicate_on} unresolved: step is {status}")]
    ConditionUnresolved { predicate_on: u32, status: String },
}

impl ErrorKind {
    pub fn step_timeout(after_ms: u64) -> Self {
        Self::Timeout {
            scope: "step".to_string(),
            after_ms,
        }
    }

    pub fn chain_timeout(after_ms: u64) -> Self {
        Self::Timeout {
            scope: "chain".to_string(),
            after_ms,
        }
    }

    pub fn binding(reason: impl Into<String>) -> Self {
        Self::ArgumentBinding {
            reason: reason.into(),
        }
    }
}

/// 逃逸到调用方的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    /// 规划结果不合法或规划能力不可用（执行前终止）
    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Chain timed out after {after_ms}ms")]
    ChainTimeout { after_ms: u64 },

    /// 调用方断开或主动取消
    #[error("Chain cancelled")]
    Cancelled,

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Config error: {0}")]
    Config(String),
}
