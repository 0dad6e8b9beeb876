// 凭据库错误类型定义

use thiserror::Error;

/// 凭据库错误
#[derive(Debug, Error)]
pub enum VaultError {
    /// 未设置加密密钥
    #[error("Encryption key is not set")]
    KeyNotSet,

    /// 解密失败（密钥错误或数据损坏）
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// 加密失败
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// 配置不存在
    #[error("Profile not found: {0}")]
    NotFound(String),

    /// 没有免密令牌
    #[error("No reauthentication session")]
    NoSession,

    /// 免密令牌已过期
    #[error("Reauthentication session expired")]
    SessionExpired,

    /// 密钥与令牌不匹配
    #[error("Key does not match the reauthentication session")]
    KeyMismatch,

    /// 有效期导致过期时间越界
    #[error("Reauthentication TTL out of range")]
    TtlOutOfRange,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
