//! 单步执行器
//!
//! execute(spec, prior, timeout)：置 Running 并计时 → 绑定参数 → 解析工具 → 带超时调用 → 生成结论。
//! 任何失败都落为 Failed 终态，不会向外抛错；execution_time_ms 无论成败都会记录。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::chain::binder::{bind, PriorResults};
use crate::chain::conclusion::conclude;
use crate::chain::types::{StepResult, StepSpec, StepStatus};
use crate::tools::ToolRegistry;

#[derive(Clone)]
pub struct StepExecutor {
    registry: Arc<ToolRegistry>,
}

impl StepExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行单个步骤，返回终态 StepResult（Completed 或 Failed）
    pub async fn execute(&self, spec: &StepSpec, prior: &PriorResults, timeout: Duration) -> StepResult {
        let mut step = StepResult::pending(spec.step_number);
        step.transition(StepStatus::Running);
        let start = Instant::now();
        let elapsed = |start: Instant| start.elapsed().as_millis() as u64;

        let args = match bind(&spec.tool_args, prior) {
            Ok(args) => args,
            Err(err) => {
                tracing::warn!(step = spec.step_number, error = %err, "argument binding failed");
                step.fail(err, elapsed(start));
                return step;
            }
        };

        let handle = match self.registry.resolve(&spec.tool_name) {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(step = spec.step_number, error = %err, "tool resolution failed");
                step.fail(err, elapsed(start));
                return step;
            }
        };

        match handle.invoke(Value::Object(args), timeout).await {
            Ok(result) => {
                let conclusion = conclude(spec, &result);
                tracing::debug!(step = spec.step_number, %conclusion, "step completed");
                step.complete(result, conclusion, elapsed(start));
            }
            Err(err) => {
                tracing::warn!(step = spec.step_number, tool = %spec.tool_name, error = %err, "step failed");
                step.fail(err, elapsed(start));
            }
        }
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::ArgValue;
    use crate::core::ErrorKind;
    use crate::tools::{register_builtin, FixtureTool};
    use serde_json::json;
    use std::collections::{BTreeMap, BTreeSet};

    fn executor() -> StepExecutor {
        let mut registry = ToolRegistry::new();
        register_builtin(&mut registry);
        registry.register(FixtureTool::constant("get_revenue_data", json!({"revenue": 45000})));
        StepExecutor::new(Arc::new(registry))
    }

    fn spec(step_number: u32, tool: &str, args: BTreeMap<String, ArgValue>) -> StepSpec {
        StepSpec {
            step_number,
            question: format!("question {step_number}"),
            tool_name: tool.to_string(),
            tool_args: args,
            depends_on: BTreeSet::new(),
            branch: None,
        }
    }

    #[tokio::test]
    async fn test_completed_step_has_conclusion_and_timing() {
        let result = executor()
            .execute(&spec(1, "get_revenue_data", BTreeMap::new()), &PriorResults::new(), Duration::from_secs(1))
            .await;
        assert_eq!(result.status, StepStatus::Completed);
        assert_eq!(result.result, Some(json!({"revenue": 45000})));
        assert_eq!(
            result.conclusion.as_deref(),
            Some("Step 1: question 1 → revenue: 45000.00")
        );
        assert!(result.execution_time_ms.is_some());
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_locally() {
        let result = executor()
            .execute(&spec(1, "get_magic", BTreeMap::new()), &PriorResults::new(), Duration::from_secs(1))
            .await;
        assert_eq!(result.status, StepStatus::Failed);
        assert!(matches!(result.error, Some(ErrorKind::ToolNotFound { .. })));
        assert!(result.execution_time_ms.is_some());
    }

    #[tokio::test]
    async fn test_binding_failure_fails_step() {
        let args = BTreeMap::from([
            ("metric_a".to_string(), ArgValue::reference(1)),
            ("metric_b".to_string(), ArgValue::literal(10)),
        ]);
        let result = executor()
            .execute(&spec(2, "compare_metrics", args), &PriorResults::new(), Duration::from_secs(1))
            .await;
        assert_eq!(result.status, StepStatus::Failed);
        assert!(matches!(result.error, Some(ErrorKind::ArgumentBinding { .. })));
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_binding_error() {
        let result = executor()
            .execute(&spec(1, "compare_metrics", BTreeMap::new()), &PriorResults::new(), Duration::from_secs(1))
            .await;
        assert!(matches!(result.error, Some(ErrorKind::ArgumentBinding { .. })));
    }
}
