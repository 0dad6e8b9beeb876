// ShellVault - SSH/SFTP 会话引擎与加密凭据库
//
// 模块结构:
// - models: 数据模型（目标配置、文件条目、设置）
// - ssh: 连接、会话注册表、交互式终端
// - services: 文件传输、凭据库、本地持久化
// - app: 对外操作门面

pub mod app;
pub mod models;
pub mod services;
pub mod ssh;

pub use app::App;
pub use models::{EngineSettings, TargetProfile, TransferMode};
pub use services::vault::{Vault, VaultError, VaultPaths};
pub use ssh::{ChannelSink, EngineEvent, EventSink, NullSink, SshError};

/// 初始化日志系统
/// 可以通过 RUST_LOG 环境变量控制日志级别，例如：RUST_LOG=debug
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false) // 不显示 target（模块路径）
        .try_init();
}
