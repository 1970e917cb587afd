//! 推理链类型定义
//!
//! 定义查询、链计划（ChainPlan / StepSpec）、参数占位符、分支谓词、步骤结果与执行汇总等核心数据类型

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ErrorKind;

pub type StepNumber = u32;

/// 响应模式：full 返回完整 trace，compact 只返回答案
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    #[default]
    Full,
    Compact,
}

/// 一次查询（不可变输入）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub mode: ResponseMode,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: None,
            mode: ResponseMode::Full,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }
}

/// 链拓扑
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainType {
    /// A → B → C，按 step_number 顺序执行
    Sequential,
    /// 无依赖步骤并发执行，受并行上限约束
    Parallel,
    /// 根据前置步骤结果选择分支
    Conditional,
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChainType::Sequential => "sequential",
            ChainType::Parallel => "parallel",
            ChainType::Conditional => "conditional",
        };
        f.write_str(s)
    }
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\$step_(\d+)(?:\.([A-Za-z0-9_.\-]+))?$").expect("valid reference pattern")
    })
}

/// 步骤参数：字面量或对前序步骤输出的引用
///
/// 线上格式沿用字符串占位符：`"$step_2"` 引用整个结果，`"$step_2.current_month.revenue"` 引用字段路径。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum ArgValue {
    Literal(Value),
    Reference {
        step: StepNumber,
        field: Option<String>,
    },
}

impl ArgValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn reference(step: StepNumber) -> Self {
        Self::Reference { step, field: None }
    }

    pub fn field(step: StepNumber, field: impl Into<String>) -> Self {
        Self::Reference {
            step,
            field: Some(field.into()),
        }
    }

    pub fn referenced_step(&self) -> Option<StepNumber> {
        match self {
            ArgValue::Reference { step, .. } => Some(*step),
            ArgValue::Literal(_) => None,
        }
    }
}

impl From<Value> for ArgValue {
    fn from(value: Value) -> Self {
        if let Value::String(s) = &value {
            if let Some(caps) = reference_pattern().captures(s) {
                if let Ok(step) = caps[1].parse::<StepNumber>() {
                    return ArgValue::Reference {
                        step,
                        field: caps.get(2).map(|m| m.as_str().to_string()),
                    };
                }
            }
        }
        ArgValue::Literal(value)
    }
}

impl From<ArgValue> for Value {
    fn from(arg: ArgValue) -> Self {
        match arg {
            ArgValue::Literal(v) => v,
            ArgValue::Reference { step, field: None } => Value::String(format!("$step_{step}")),
            ArgValue::Reference {
                step,
                field: Some(field),
            } => Value::String(format!("$step_{step}.{field}")),
        }
    }
}

/// 按点分路径取字段；空路径返回根值，数组下标用数字段
pub fn lookup_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// 分支谓词（由规划器以数据形式给出，执行器只负责求值）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    GreaterThan { field: String, threshold: f64 },
    LessThan { field: String, threshold: f64 },
    Equals { field: String, value: Value },
    /// left 字段 > right 字段（如 current > previous）
    FieldGreaterThan { left: String, right: String },
    FieldLessThan { left: String, right: String },
    IsTrue { field: String },
}

impl Predicate {
    /// 对条件步骤的 result 求值；字段缺失或类型不符时为 false
    pub fn evaluate(&self, result: &Value) -> bool {
        let number = |path: &str| lookup_field(result, path).and_then(Value::as_f64);
        match self {
            Predicate::GreaterThan { field, threshold } => {
                number(field).is_some_and(|v| v > *threshold)
            }
            Predicate::LessThan { field, threshold } => {
                number(field).is_some_and(|v| v < *threshold)
            }
            Predicate::Equals { field, value } => lookup_field(result, field) == Some(value),
            Predicate::FieldGreaterThan { left, right } => {
                matches!((number(left), number(right)), (Some(l), Some(r)) if l > r)
            }
            Predicate::FieldLessThan { left, right } => {
                matches!((number(left), number(right)), (Some(l), Some(r)) if l < r)
            }
            Predicate::IsTrue { field } => {
                lookup_field(result, field).and_then(Value::as_bool) == Some(true)
            }
        }
    }
}

/// 条件分支：predicate_on 步骤完成后求值，选中一侧执行，另一侧跳过
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSpec {
    pub predicate_on: StepNumber,
    pub predicate: Predicate,
    #[serde(default)]
    pub on_true: BTreeSet<StepNumber>,
    #[serde(default)]
    pub on_false: BTreeSet<StepNumber>,
}

/// 链中的单个步骤定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub step_number: StepNumber,
    pub question: String,
    #[serde(rename = "tool_to_use", alias = "tool_name")]
    pub tool_name: String,
    #[serde(default)]
    pub tool_args: BTreeMap<String, ArgValue>,
    #[serde(default)]
    pub depends_on: BTreeSet<StepNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchSpec>,
}

impl StepSpec {
    /// 参数中引用到的所有步骤
    pub fn referenced_steps(&self) -> BTreeSet<StepNumber> {
        self.tool_args
            .values()
            .filter_map(ArgValue::referenced_step)
            .collect()
    }
}

/// 规划结果：执行开始后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainPlan {
    pub chain_type: ChainType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub steps: Vec<StepSpec>,
}

impl ChainPlan {
    pub fn step(&self, step_number: StepNumber) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.step_number == step_number)
    }

    pub fn branches(&self) -> impl Iterator<Item = &BranchSpec> {
        self.steps.iter().filter_map(|s| s.branch.as_ref())
    }
}

/// 步骤状态：Pending → Running → {Completed, Failed}，或 Pending → Skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }

    pub fn can_transition_to(self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Pending, StepStatus::Skipped)
                | (StepStatus::Running, StepStatus::Completed)
                | (StepStatus::Running, StepStatus::Failed)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// 单步执行结果（运行期间仅由 ChainExecutor 写入）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_number: StepNumber,
    pub status: StepStatus,
    pub result: Option<Value>,
    pub conclusion: Option<String>,
    pub error: Option<ErrorKind>,
    pub execution_time_ms: Option<u64>,
    /// 跳过原因（依赖失败 / 分支未选中 / 取消）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl StepResult {
    pub fn pending(step_number: StepNumber) -> Self {
        Self {
            step_number,
            status: StepStatus::Pending,
            result: None,
            conclusion: None,
            error: None,
            execution_time_ms: None,
            skip_reason: None,
        }
    }

    /// 状态迁移；非法迁移被拒绝并返回 false
    pub fn transition(&mut self, next: StepStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                step = self.step_number,
                from = %self.status,
                to = %next,
                "illegal step transition rejected"
            );
            return false;
        }
        self.status = next;
        true
    }

    pub fn complete(&mut self, result: Value, conclusion: String, elapsed_ms: u64) -> bool {
        if !self.transition(StepStatus::Completed) {
            return false;
        }
        self.result = Some(result);
        self.conclusion = Some(conclusion);
        self.execution_time_ms = Some(elapsed_ms);
        true
    }

    pub fn fail(&mut self, error: ErrorKind, elapsed_ms: u64) -> bool {
        if !self.transition(StepStatus::Failed) {
            return false;
        }
        self.error = Some(error);
        self.execution_time_ms = Some(elapsed_ms);
        true
    }

    pub fn skip(&mut self, reason: impl Into<String>) -> bool {
        if !self.transition(StepStatus::Skipped) {
            return false;
        }
        self.skip_reason = Some(reason.into());
        true
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

/// 执行汇总；链结束时 completed + failed + skipped == total_steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total_steps: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_time_ms: u64,
}

impl ExecutionSummary {
    pub fn from_results(results: &[StepResult], total_time_ms: u64) -> Self {
        let count = |status: StepStatus| results.iter().filter(|r| r.status == status).count();
        Self {
            total_steps: results.len(),
            completed: count(StepStatus::Completed),
            failed: count(StepStatus::Failed),
            skipped: count(StepStatus::Skipped),
            total_time_ms,
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.completed + self.failed + self.skipped == self.total_steps
    }
}

/// 链级状态：Planning → Executing → Synthesizing → Done，或 → Aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    Planning,
    Executing,
    Synthesizing,
    Done,
    Aborted,
}

/// 一次查询的完整执行记录，按请求创建、响应后丢弃
#[derive(Debug, Clone, Serialize)]
pub struct ChainRun {
    pub id: String,
    pub query: Query,
    pub plan: ChainPlan,
    /// 与 plan.steps 一一对应、同序
    pub results: Vec<StepResult>,
    pub summary: ExecutionSummary,
    pub final_answer: String,
    pub status: ChainStatus,
    /// 链级问题（条件未决、整链超时等）
    pub issues: Vec<ErrorKind>,
    /// 中止原因（整链超时 / 取消）
    pub abort_reason: Option<String>,
    pub started_at: i64,
}

impl ChainRun {
    pub fn is_aborted(&self) -> bool {
        self.status == ChainStatus::Aborted
    }
}
