use clap::Parser;
use snapkeep_cli::{Cli, CliApp, Commands, run_init, setup_logging};
use snapkeep_core::SnapError;
use tracing::error;

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let cli = Cli::parse();

    // 设置日志记录，guard 需要持有到进程结束
    let log_guard = setup_logging(cli.verbose);

    // `init` 命令是特例，它不需要预先加载配置
    if let Commands::Init { force } = cli.command {
        if let Err(e) = run_init(&cli.config, force).await {
            error!("❌ 初始化失败: {}", e);
            drop(log_guard);
            std::process::exit(1);
        }
        return;
    }

    let mut app = match CliApp::new(&cli.config, cli.actor.clone()).await {
        Ok(app) => app,
        Err(SnapError::ConfigNotFound) => {
            error!("❌ 配置文件 '{}' 未找到。", cli.config.display());
            error!("👉 请先运行 'snapkeep init' 命令来创建配置文件。");
            drop(log_guard);
            std::process::exit(1);
        }
        Err(e) => {
            error!("❌ 应用初始化失败: {}", e);
            drop(log_guard);
            std::process::exit(1);
        }
    };

    // 运行命令
    if let Err(e) = app.run(cli.command).await {
        match e.downcast_ref::<SnapError>() {
            Some(snap_error) => error!("❌ 操作失败: {}", snap_error.diagnostic()),
            None => error!("❌ 操作失败: {:#}", e),
        }
        // 退出前刷新文件日志
        drop(log_guard);
        std::process::exit(1);
    }
}
