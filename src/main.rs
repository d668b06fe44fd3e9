use anyhow::Result;
use law_matcher::utils::logging;
use law_matcher::{App, Config};
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env()?;

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    let app = App::initialize(config).await?;

    let cancel = app.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 收到中断信号，等待在途调用完成后停止...");
            cancel.cancel();
        }
    });

    app.run().await?;

    Ok(())
}
