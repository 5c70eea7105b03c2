use anyhow::Result;
use resume_relay::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化并运行应用
    let summary = App::initialize(config).await?.run().await?;

    if summary.aborted {
        std::process::exit(resume_relay::control::signal_monitor::ABORT_EXIT_CODE);
    }
    Ok(())
}
