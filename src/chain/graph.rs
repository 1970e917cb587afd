//! 步骤依赖图
//!
//! 使用邻接表和入度表驱动并行调度：依赖全部进入终态的步骤才会被放入就绪队列

use std::collections::{BTreeMap, BTreeSet};

use crate::chain::types::{ChainPlan, StepNumber};

/// 步骤依赖图
pub struct DependencyGraph {
    /// 邻接表：步骤号 -> 依赖该步骤的步骤列表
    adjacency: BTreeMap<StepNumber, BTreeSet<StepNumber>>,
    /// 入度表：步骤号 -> 尚未进入终态的依赖数
    in_degree: BTreeMap<StepNumber, usize>,
}

impl DependencyGraph {
    /// 创建依赖图；引用不存在步骤的依赖被忽略（计划校验阶段已拒绝此类计划）
    pub fn new(plan: &ChainPlan) -> Self {
        let mut adjacency: BTreeMap<StepNumber, BTreeSet<StepNumber>> = BTreeMap::new();
        let mut in_degree: BTreeMap<StepNumber, usize> = BTreeMap::new();

        for step in &plan.steps {
            in_degree.insert(step.step_number, 0);
            adjacency.entry(step.step_number).or_default();
        }

        for step in &plan.steps {
            for dep in &step.depends_on {
                if !in_degree.contains_key(dep) {
                    continue;
                }
                if adjacency.entry(*dep).or_default().insert(step.step_number) {
                    *in_degree.entry(step.step_number).or_insert(0) += 1;
                }
            }
        }

        Self {
            adjacency,
            in_degree,
        }
    }

    /// 无依赖的步骤（按步骤号升序）
    pub fn roots(&self) -> Vec<StepNumber> {
        self.in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(step, _)| *step)
            .collect()
    }

    /// 标记步骤进入终态，返回新变为就绪的步骤（按步骤号升序）
    pub fn resolve(&mut self, finished: StepNumber) -> Vec<StepNumber> {
        let mut newly_ready = Vec::new();
        if let Some(dependents) = self.adjacency.get(&finished) {
            for dependent in dependents {
                if let Some(degree) = self.in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        newly_ready.push(*dependent);
                    }
                }
            }
        }
        newly_ready
    }
}
