//! 可观测性：tracing 订阅器初始化（默认 info，可通过 RUST_LOG 覆盖；日志写 stderr，stdout 留给 JSON 输出）

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
