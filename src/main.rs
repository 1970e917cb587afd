//! Reasoning Chain CLI
//!
//! 用法：`reasoning-chain [--config PATH] [--context TEXT] [--compact] [--events] <query...>`
//!
//! 输出响应 JSON 到 stdout；`--events` 时把链执行事件逐行写到 stderr。Ctrl+C 取消进行中的链。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use reasoning_chain::chain::EventSink;
use reasoning_chain::config::load_config;
use reasoning_chain::core::{ReasoningOrchestrator, ReasoningResponse, ShutdownManager};
use reasoning_chain::{observability, Query, ResponseMode};

/// 多步推理链：拆解问题、执行工具链并综合答案
#[derive(Parser, Debug)]
#[command(name = "reasoning-chain")]
#[command(about = "Multi-step reasoning chain orchestrator", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（覆盖 config/default.toml）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 附加上下文
    #[arg(long)]
    context: Option<String>,

    /// 只返回答案
    #[arg(long)]
    compact: bool,

    /// 把链执行事件逐行写到 stderr
    #[arg(long)]
    events: bool,

    /// 查询文本
    #[arg(required = true, trailing_var_arg = true)]
    query: Vec<String>,
}

impl Cli {
    fn mode(&self) -> ResponseMode {
        if self.compact {
            ResponseMode::Compact
        } else {
            ResponseMode::Full
        }
    }

    fn query(&self) -> Query {
        let query = Query::new(self.query.join(" ")).with_mode(self.mode());
        match &self.context {
            Some(context) => query.with_context(context.clone()),
            None => query,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    let orchestrator = ReasoningOrchestrator::from_config(&cfg).context("Failed to build orchestrator")?;

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let query = cli.query();

    let events = if cli.events {
        let (sink, mut rx) = EventSink::channel();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{line}");
                }
            }
        });
        sink
    } else {
        EventSink::none()
    };

    let response = match orchestrator.run(query, shutdown.child_token(), events).await {
        Ok(run) => ReasoningResponse::from_run(&run),
        Err(e) => ReasoningResponse::failure(e.to_string()),
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("Failed to encode response")?
    );

    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
