//! Reasoning Chain - 多步推理链编排器
//!
//! 把一个业务问题拆解为若干工具调用步骤，按链拓扑（顺序 / 并行 / 条件）执行，再综合为一个可追溯的答案。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、请求 / 响应格式、推理编排器、优雅关闭
//! - **chain**: 链计划类型、参数绑定、单步执行、链调度
//! - **planning**: 查询拆解（LLM / 预置计划）与计划校验
//! - **synthesis**: 最终答案综合（模板 / LLM）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **tools**: 工具注册表、参数 Schema、内置分析工具、配置数据工具
//! - **observability**: 日志初始化

pub mod chain;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod planning;
pub mod synthesis;
pub mod tools;

pub use crate::chain::{ChainPlan, ChainRun, ChainType, Query, ResponseMode};
pub use crate::core::{ChainError, ErrorKind, ReasoningOrchestrator, ReasoningRequest, ReasoningResponse};
