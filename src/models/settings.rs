// Settings 配置数据结构

use serde::{Deserialize, Serialize};

// ======================== 主配置结构 ========================

/// 引擎设置（持久化用）
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EngineSettings {
    pub connection: ConnectionSettings,
    pub transfer: TransferSettings,
    pub terminal: TerminalSettings,
    pub vault: VaultSettings,
}

// ======================== 连接设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionSettings {
    /// 连接超时（秒）
    pub connection_timeout_secs: u64,
    /// 应用层心跳间隔（秒），0 表示不启用
    pub keepalive_interval_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_timeout_secs: 10,
            keepalive_interval_secs: 60,
        }
    }
}

// ======================== 传输设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransferSettings {
    /// sudo 传输时的共享中转目录
    pub scratch_dir: String,
    /// SFTP 流式复制的块大小
    pub chunk_size: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            scratch_dir: "/tmp".to_string(),
            chunk_size: 32 * 1024,
        }
    }
}

// ======================== 终端设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerminalSettings {
    pub term: String,
    pub cols: u32,
    pub rows: u32,
    pub lang: String,
    /// 输出读取缓冲区大小
    pub read_buffer: usize,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            term: "xterm-256color".to_string(),
            cols: 120,
            rows: 30,
            lang: "en_US.UTF-8".to_string(),
            read_buffer: 1024,
        }
    }
}

// ======================== 凭据库设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VaultSettings {
    /// 免密恢复令牌有效期（小时）
    pub reauth_ttl_hours: i64,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            reauth_ttl_hours: 24,
        }
    }
}

/// 令牌有效期上限（小时）
pub const MAX_REAUTH_TTL_HOURS: i64 = 24 * 366;

impl VaultSettings {
    /// 令牌有效期，超出 [0, MAX_REAUTH_TTL_HOURS] 的配置值被截断
    pub fn reauth_ttl(&self) -> chrono::Duration {
        let hours = self.reauth_ttl_hours.clamp(0, MAX_REAUTH_TTL_HOURS);
        chrono::Duration::try_hours(hours).unwrap_or_else(chrono::Duration::zero)
    }

    pub fn reauth_ttl_in_range(&self) -> bool {
        (0..=MAX_REAUTH_TTL_HOURS).contains(&self.reauth_ttl_hours)
    }
}
