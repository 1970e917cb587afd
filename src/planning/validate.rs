//! 计划校验：规划结果不合法时整体拒绝（PlanningError），不做局部修补
//!
//! 规则：
//! - 至少一个步骤，且不超过 max_steps
//! - 步骤号从 1 起、唯一、按计划顺序严格递增
//! - depends_on 与占位符引用只能指向已存在且编号更小的步骤（由此保证无环）
//! - 占位符引用的步骤必须出现在 depends_on 中
//! - branch 只允许出现在 Conditional 计划中；predicate_on 存在，分支臂只能包含编号大于 predicate_on 的已存在步骤
//! - 每个步骤至多属于一个分支臂

use std::collections::{BTreeSet, HashMap};

use crate::chain::types::{ChainPlan, ChainType, StepNumber};
use crate::core::ChainError;

fn reject(reason: impl Into<String>) -> Result<(), ChainError> {
    Err(ChainError::Planning(reason.into()))
}

pub fn validate_plan(plan: &ChainPlan, max_steps: usize) -> Result<(), ChainError> {
    if plan.steps.is_empty() {
        return reject("plan has no steps");
    }
    if plan.steps.len() > max_steps {
        return reject(format!(
            "plan has {} steps, limit is {max_steps}",
            plan.steps.len()
        ));
    }

    let mut previous: StepNumber = 0;
    for step in &plan.steps {
        if step.step_number == 0 {
            return reject("step numbers start at 1");
        }
        if step.step_number <= previous {
            return reject(format!(
                "step {} is duplicated or out of order",
                step.step_number
            ));
        }
        previous = step.step_number;
    }
    let numbers: BTreeSet<StepNumber> = plan.steps.iter().map(|s| s.step_number).collect();

    for step in &plan.steps {
        let n = step.step_number;
        if step.question.trim().is_empty() {
            return reject(format!("step {n} has an empty question"));
        }
        if step.tool_name.trim().is_empty() {
            return reject(format!("step {n} names no tool"));
        }
        for dep in &step.depends_on {
            if *dep >= n || !numbers.contains(dep) {
                return reject(format!("step {n} depends on invalid step {dep}"));
            }
        }
        for referenced in step.referenced_steps() {
            if referenced >= n || !numbers.contains(&referenced) {
                return reject(format!("step {n} references invalid step {referenced}"));
            }
            if !step.depends_on.contains(&referenced) {
                return reject(format!(
                    "step {n} references step {referenced} without depending on it"
                ));
            }
        }
    }

    let mut arm_owner: HashMap<StepNumber, StepNumber> = HashMap::new();
    for branch in plan.branches() {
        if plan.chain_type != ChainType::Conditional {
            return reject(format!(
                "branch on step {} in a {} plan",
                branch.predicate_on, plan.chain_type
            ));
        }
        if !numbers.contains(&branch.predicate_on) {
            return reject(format!(
                "branch predicate references missing step {}",
                branch.predicate_on
            ));
        }
        for arm_step in branch.on_true.iter().chain(branch.on_false.iter()) {
            if *arm_step <= branch.predicate_on || !numbers.contains(arm_step) {
                return reject(format!(
                    "branch on step {} names invalid arm step {arm_step}",
                    branch.predicate_on
                ));
            }
            if arm_owner.insert(*arm_step, branch.predicate_on).is_some() {
                return reject(format!("step {arm_step} belongs to more than one branch arm"));
            }
        }
    }

    // 同一步骤号上只能挂一个分支，挂载点必须就是 predicate_on
    for step in &plan.steps {
        if let Some(branch) = &step.branch {
            if branch.predicate_on != step.step_number {
                return reject(format!(
                    "branch declared on step {} predicates on step {}",
                    step.step_number, branch.predicate_on
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::{ArgValue, Predicate};
    use crate::chain::ChainPlanBuilder;

    fn predicate() -> Predicate {
        Predicate::FieldGreaterThan {
            left: "current".into(),
            right: "previous".into(),
        }
    }

    #[test]
    fn test_valid_conditional_plan() {
        let plan = ChainPlanBuilder::new(ChainType::Conditional)
            .step(1, "check", "get_health_scores")
            .branch(1, predicate(), [2], [3])
            .step(2, "analyze", "analyze")
            .step(3, "report", "report")
            .build_unchecked();
        assert!(validate_plan(&plan, 10).is_ok());
    }

    #[test]
    fn test_empty_and_oversized_plans() {
        let empty = ChainPlanBuilder::new(ChainType::Sequential).build_unchecked();
        assert!(validate_plan(&empty, 10).is_err());

        let plan = ChainPlanBuilder::new(ChainType::Sequential)
            .step(1, "a", "t")
            .step(2, "b", "t")
            .build_unchecked();
        assert!(matches!(validate_plan(&plan, 1), Err(ChainError::Planning(_))));
    }

    #[test]
    fn test_reference_must_be_declared_dependency() {
        let mut plan = ChainPlanBuilder::new(ChainType::Sequential)
            .step(1, "a", "t")
            .step(2, "b", "t")
            .arg(2, "x", ArgValue::reference(1))
            .build_unchecked();
        assert!(validate_plan(&plan, 10).is_ok());
        plan.steps[1].depends_on.clear();
        assert!(validate_plan(&plan, 10).is_err());
    }

    #[test]
    fn test_self_and_forward_dependencies_rejected() {
        let plan = ChainPlanBuilder::new(ChainType::Parallel)
            .step(1, "a", "t")
            .depends_on(1, [1])
            .build_unchecked();
        assert!(validate_plan(&plan, 10).is_err());
    }

    #[test]
    fn test_duplicate_step_numbers_rejected() {
        let mut plan = ChainPlanBuilder::new(ChainType::Sequential)
            .step(1, "a", "t")
            .step(2, "b", "t")
            .build_unchecked();
        plan.steps[1].step_number = 1;
        assert!(validate_plan(&plan, 10).is_err());
    }

    #[test]
    fn test_branch_rules() {
        let outside_conditional = ChainPlanBuilder::new(ChainType::Sequential)
            .step(1, "check", "t")
            .branch(1, predicate(), [2], [])
            .step(2, "x", "t")
            .build_unchecked();
        assert!(validate_plan(&outside_conditional, 10).is_err());

        let backwards_arm = ChainPlanBuilder::new(ChainType::Conditional)
            .step(1, "x", "t")
            .step(2, "check", "t")
            .branch(2, predicate(), [1], [])
            .build_unchecked();
        assert!(validate_plan(&backwards_arm, 10).is_err());

        let shared_arm = ChainPlanBuilder::new(ChainType::Conditional)
            .step(1, "check", "t")
            .branch(1, predicate(), [3], [])
            .step(2, "check again", "t")
            .branch(2, predicate(), [], [3])
            .step(3, "x", "t")
            .build_unchecked();
        assert!(validate_plan(&shared_arm, 10).is_err());
    }
}
