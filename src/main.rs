use anyhow::Result;
use question_queue::utils::logging;
use question_queue::{App, Config};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置：优先命令行给出的 TOML 文件，否则读环境变量
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_toml_file(Path::new(&path))?,
        None => Config::from_env(),
    };

    // 初始化日志
    logging::init(&config);

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
