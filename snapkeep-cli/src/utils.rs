use snapkeep_core::constants::logging::LOG_FILE_ENV;
use tracing_appender::non_blocking::WorkerGuard;

/// # Snapkeep CLI 日志说明
///
/// 库代码只使用 `tracing` 宏，日志输出行为在应用入口配置。
///
/// - `-v, --verbose`：启用 DEBUG 级别
/// - `RUST_LOG`：标准的日志级别控制，优先于 `--verbose`
/// - `SNAPKEEP_LOG_FILE`：日志文件路径，设置后日志以非阻塞方式追加到文件
///
/// ```bash
/// SNAPKEEP_LOG_FILE=snapkeep.log snapkeep backup
/// RUST_LOG=snapkeep::audit=info,snapkeep_core=debug snapkeep restore <ID>
/// ```
///
/// 返回的 guard 必须在 `main` 中一直持有，否则文件日志可能丢失。
pub fn setup_logging(verbose: bool) -> Option<WorkerGuard> {
    use tracing_subscriber::{EnvFilter, fmt};

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Ok(log_file) = std::env::var(LOG_FILE_ENV) {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
        {
            Ok(file) => {
                // 文件输出使用详细格式便于排查
                let (writer, guard) = tracing_appender::non_blocking(file);
                fmt()
                    .with_env_filter(env_filter)
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_line_number(true)
                    .init();
                return Some(guard);
            }
            Err(e) => {
                eprintln!("无法打开日志文件 {log_file}: {e}，改为输出到终端");
            }
        }
    }

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_names(false)
        .with_line_number(false)
        .without_time()
        .compact()
        .init();
    None
}

/// 读取用户确认，只有输入 y/yes 时返回 true
pub fn confirm(prompt: &str) -> std::io::Result<bool> {
    use std::io::Write;

    print!("{prompt} (y/N): ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(is_affirmative(&input))
}

fn is_affirmative(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("no"));
    }
}
