// SSH 错误类型定义

use thiserror::Error;

/// SSH 会话引擎错误类型
#[derive(Debug, Error)]
pub enum SshError {
    /// 配置错误（端口非法等）
    #[error("Configuration error: {0}")]
    Config(String),

    /// 认证配置错误（既没有私钥也没有密码，或私钥无法解析）
    #[error("Authentication config error: {0}")]
    AuthConfig(String),

    /// 连接失败（DNS、拒绝连接、握手失败）
    #[error("Connection failed: {0}")]
    Connect(String),

    /// 连接超时
    #[error("Connection timeout after {0}s")]
    Timeout(u64),

    /// 认证失败
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// 密钥错误
    #[error("Key error: {0}")]
    Key(String),

    /// SSH 协议错误
    #[error("SSH protocol error: {0}")]
    Protocol(String),

    /// 通道错误
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO 错误（本地文件等）
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 会话不存在或已关闭
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// 终端会话不存在
    #[error("Terminal not found: {0}")]
    TerminalNotFound(String),

    /// 传输失败，或远程命令返回非零退出码（附带合并输出）
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// SFTP 子系统错误
    #[error("SFTP error: {0}")]
    Sftp(String),
}

impl From<russh::Error> for SshError {
    fn from(e: russh::Error) -> Self {
        SshError::Protocol(e.to_string())
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(e: russh::keys::Error) -> Self {
        SshError::Key(e.to_string())
    }
}

impl From<russh_sftp::client::error::Error> for SshError {
    fn from(e: russh_sftp::client::error::Error) -> Self {
        SshError::Sftp(e.to_string())
    }
}
