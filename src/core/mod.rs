//! 核心编排层：错误类型、请求 / 响应格式、推理编排器、优雅关闭

pub mod dto;
pub mod error;
pub mod orchestrator;
pub mod shutdown;

pub use dto::{CompactResponse, FailureResponse, FullResponse, ReasoningRequest, ReasoningResponse, StepTrace};
pub use error::{ChainError, ErrorKind};
pub use orchestrator::ReasoningOrchestrator;
pub use shutdown::{ShutdownManager, ShutdownReason};
