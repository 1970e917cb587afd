//! 规划层：查询拆解、提示词与计划校验

pub mod planner;
pub mod prompt;
pub mod validate;

pub use planner::{fallback_plan, LlmPlanner, Planner, StaticPlanner};
pub use prompt::{decomposition_prompt, extract_json, plan_schema_json};
pub use validate::validate_plan;
