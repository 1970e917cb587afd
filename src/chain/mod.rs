//! 推理链：类型、计划构建、参数绑定、单步执行与链调度

pub mod binder;
pub mod builder;
pub mod conclusion;
pub mod events;
pub mod executor;
pub mod graph;
pub mod step;
pub mod types;

pub use binder::{bind, PriorResults};
pub use builder::ChainPlanBuilder;
pub use events::{ChainEvent, EventSink};
pub use executor::{ChainExecutor, ChainOutcome, ExecutionLimits};
pub use graph::DependencyGraph;
pub use step::StepExecutor;
pub use types::*;
