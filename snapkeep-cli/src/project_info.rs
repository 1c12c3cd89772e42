/// Snapkeep CLI 项目信息模块
///
/// snapkeep-cli 是面向用户的主程序，项目元数据统一在这里定义，
/// snapkeep-core 作为内部库只提供技术性常量

/// 项目元数据（自动从 Cargo.toml 同步）
pub mod metadata {
    /// 项目名称
    pub const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

    /// 项目描述
    pub const PROJECT_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

    /// 项目作者
    pub const PROJECT_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

    /// 用户友好的显示名称（手动维护）
    pub mod display {
        /// CLI 工具的完整名称
        pub const CLI_FULL_NAME: &str = "Snapkeep CLI";

        /// 项目详细描述
        pub const DESCRIPTION_LONG: &str = "把应用的数据存储、资源文件和系统设置打包成单个可移植归档，\
            记录每次备份的来源、状态和失败原因，并可按需整体恢复";
    }
}

/// 版本信息
pub mod version_info {
    /// CLI 版本
    pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

    /// 核心库版本
    pub const CORE_VERSION: &str = snapkeep_core::constants::version::version_info::CORE_VERSION;
}

/// 获取完整的版本信息字符串
pub fn get_full_version_string() -> String {
    format!(
        "{} v{} (core v{})\n{}",
        metadata::display::CLI_FULL_NAME,
        version_info::CLI_VERSION,
        version_info::CORE_VERSION,
        metadata::PROJECT_DESCRIPTION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_version_string() {
        let text = get_full_version_string();
        assert!(text.starts_with("Snapkeep CLI v"));
        assert!(text.contains(version_info::CORE_VERSION));
    }
}
