pub mod analysis;
pub mod executor;
pub mod fixture;
pub mod registry;
pub mod schema;

pub use analysis::{extract_numeric, AggregateResultsTool, CalculateTrendsTool, CompareMetricsTool};
pub use executor::ToolHandle;
pub use fixture::{register_fixtures, FixtureTool};
pub use registry::{Tool, ToolRegistry};
pub use schema::{ArgSpec, ArgType, ToolSchema};

/// 注册全部内置分析工具
pub fn register_builtin(registry: &mut ToolRegistry) {
    registry.register(CompareMetricsTool);
    registry.register(CalculateTrendsTool);
    registry.register(AggregateResultsTool);
}
