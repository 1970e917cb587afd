//! 链计划构建器
//!
//! 提供流畅的API来手工构建 ChainPlan（测试、静态规划器、演示用）

use std::collections::BTreeMap;

use crate::chain::types::*;
use crate::core::ChainError;
use crate::planning::validate_plan;

/// 链计划构建器
pub struct ChainPlanBuilder {
    chain_type: ChainType,
    reasoning: Option<String>,
    steps: BTreeMap<StepNumber, StepSpec>,
}

impl ChainPlanBuilder {
    /// 创建新的构建器
    pub fn new(chain_type: ChainType) -> Self {
        Self {
            chain_type,
            reasoning: None,
            steps: BTreeMap::new(),
        }
    }

    /// 设置拆解思路
    pub fn reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// 添加步骤（同号步骤被覆盖）
    pub fn step(
        mut self,
        step_number: StepNumber,
        question: impl Into<String>,
        tool: impl Into<String>,
    ) -> Self {
        self.steps.insert(
            step_number,
            StepSpec {
                step_number,
                question: question.into(),
                tool_name: tool.into(),
                tool_args: BTreeMap::new(),
                depends_on: Default::default(),
                branch: None,
            },
        );
        self
    }

    /// 设置步骤参数；引用类参数自动补进 depends_on
    pub fn arg(mut self, step_number: StepNumber, name: impl Into<String>, value: ArgValue) -> Self {
        if let Some(step) = self.steps.get_mut(&step_number) {
            if let Some(source) = value.referenced_step() {
                step.depends_on.insert(source);
            }
            step.tool_args.insert(name.into(), value);
        }
        self
    }

    /// 设置依赖
    pub fn depends_on(
        mut self,
        step_number: StepNumber,
        deps: impl IntoIterator<Item = StepNumber>,
    ) -> Self {
        if let Some(step) = self.steps.get_mut(&step_number) {
            step.depends_on.extend(deps);
        }
        self
    }

    /// 在 predicate_on 步骤上挂载分支
    pub fn branch(
        mut self,
        predicate_on: StepNumber,
        predicate: Predicate,
        on_true: impl IntoIterator<Item = StepNumber>,
        on_false: impl IntoIterator<Item = StepNumber>,
    ) -> Self {
        if let Some(step) = self.steps.get_mut(&predicate_on) {
            step.branch = Some(BranchSpec {
                predicate_on,
                predicate,
                on_true: on_true.into_iter().collect(),
                on_false: on_false.into_iter().collect(),
            });
        }
        self
    }

    /// 构建并校验
    pub fn build(self) -> Result<ChainPlan, ChainError> {
        let plan = self.build_unchecked();
        validate_plan(&plan, usize::MAX)?;
        Ok(plan)
    }

    /// 构建但不校验
    pub fn build_unchecked(self) -> ChainPlan {
        ChainPlan {
            chain_type: self.chain_type,
            reasoning: self.reasoning,
            steps: self.steps.into_values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_sequential_plan() {
        let plan = ChainPlanBuilder::new(ChainType::Sequential)
            .reasoning("compare two periods")
            .step(2, "last month", "get_revenue_data")
            .step(1, "this month", "get_revenue_data")
            .step(3, "compare", "compare_metrics")
            .arg(3, "metric_a", ArgValue::field(1, "revenue"))
            .arg(3, "metric_b", ArgValue::field(2, "revenue"))
            .build()
            .expect("Failed to build plan");

        let numbers: Vec<_> = plan.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(plan.steps[2].depends_on.len(), 2);
    }

    #[test]
    fn test_build_rejects_forward_reference() {
        let result = ChainPlanBuilder::new(ChainType::Sequential)
            .step(1, "a", "tool")
            .arg(1, "x", ArgValue::reference(2))
            .step(2, "b", "tool")
            .build();
        assert!(result.is_err());
    }
}
