//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `REASONING__*` 覆盖（双下划线表示嵌套，如 `REASONING__CHAIN__MAX_PARALLEL_STEPS=8`）。

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::ChainError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub chain: ChainSettings,
    pub planner: PlannerSection,
    pub synthesis: SynthesisSection,
    pub tools: ToolsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：规划 / 综合能力的后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：mock / openai / deepseek
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 读取 API Key 的环境变量名
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

fn default_provider() -> String {
    "mock".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

/// [chain] 段：单步超时、整链超时、并行上限、步数与查询长度上限
#[derive(Debug, Clone, Deserialize)]
pub struct ChainSettings {
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    #[serde(default = "default_chain_timeout_secs")]
    pub chain_timeout_secs: u64,
    #[serde(default = "default_max_parallel_steps")]
    pub max_parallel_steps: usize,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
}

fn default_step_timeout_ms() -> u64 {
    30_000
}

fn default_chain_timeout_secs() -> u64 {
    300
}

fn default_max_parallel_steps() -> usize {
    4
}

fn default_max_steps() -> usize {
    10
}

fn default_max_query_chars() -> usize {
    10_000
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            step_timeout_ms: default_step_timeout_ms(),
            chain_timeout_secs: default_chain_timeout_secs(),
            max_parallel_steps: default_max_parallel_steps(),
            max_steps: default_max_steps(),
            max_query_chars: default_max_query_chars(),
        }
    }
}

impl ChainSettings {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn chain_timeout(&self) -> Duration {
        Duration::from_secs(self.chain_timeout_secs)
    }

    /// 校验上限类配置；step_timeout_ms 允许为 0（任何会挂起的工具都会立即超时）
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.max_parallel_steps == 0 {
            return Err(ChainError::Config("max_parallel_steps must be > 0".to_string()));
        }
        if self.max_steps == 0 {
            return Err(ChainError::Config("max_steps must be > 0".to_string()));
        }
        if self.max_query_chars == 0 {
            return Err(ChainError::Config("max_query_chars must be > 0".to_string()));
        }
        if self.chain_timeout_secs == 0 {
            return Err(ChainError::Config("chain_timeout_secs must be > 0".to_string()));
        }
        Ok(())
    }
}

/// [planner] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PlannerSection {
    /// 规划能力调用失败或无 JSON 时使用的单步兜底工具
    pub fallback_tool: Option<String>,
}

/// [synthesis] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SynthesisSection {
    /// 是否调用 LLM 生成最终答案（失败时回退到模板）
    #[serde(default)]
    pub use_llm: bool,
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToolsSection {
    /// 静态数据工具：名称 -> 定义
    #[serde(default)]
    pub fixtures: HashMap<String, FixtureSection>,
}

/// [tools.fixtures.<name>] 段：按 key_arg 的取值返回 results 中对应条目，否则返回 result
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FixtureSection {
    #[serde(default)]
    pub description: String,
    pub key_arg: Option<String>,
    #[serde(default)]
    pub results: HashMap<String, serde_json::Value>,
    pub result: Option<serde_json::Value>,
}

/// 从 config 目录加载配置，环境变量 REASONING__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 REASONING__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("REASONING")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
