// SSH 连接配置

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::{Credential, EngineSettings, TargetProfile};

use super::error::SshError;

/// SSH 连接配置
#[derive(Clone, Debug)]
pub struct SshConfig {
    /// 目标主机
    pub host: String,
    /// 端口
    pub port: u16,
    /// 用户名
    pub username: String,
    /// 认证方式
    pub auth: AuthMethod,
    /// 连接超时（秒）
    pub connect_timeout: u64,
}

/// 认证方式
#[derive(Clone, Debug)]
pub enum AuthMethod {
    /// 密码认证
    Password(String),
    /// 公钥认证（私钥文件路径）
    PublicKey { key_path: PathBuf },
}

impl SshConfig {
    /// 从目标配置构建连接配置
    ///
    /// 私钥优先于密码；两者都为空时返回 `AuthConfig` 错误。
    pub fn from_profile(
        profile: &TargetProfile,
        settings: &EngineSettings,
    ) -> Result<Self, SshError> {
        let auth = match profile.credential() {
            Some(Credential::KeyFile(key_path)) => AuthMethod::PublicKey { key_path },
            Some(Credential::Password(password)) => AuthMethod::Password(password),
            None => {
                return Err(SshError::AuthConfig(
                    "no password or private key provided".to_string(),
                ))
            }
        };

        let port = parse_port(&profile.port)?;

        Ok(Self {
            host: profile.host.trim().to_string(),
            port,
            username: profile.username.clone(),
            auth,
            connect_timeout: settings.connection.connection_timeout_secs,
        })
    }

    /// 连接地址（IPv6 字面量加方括号）
    pub fn address(&self) -> String {
        format_address(&self.host, self.port)
    }

    /// 构建 russh 配置
    pub fn to_russh_config(&self) -> russh::client::Config {
        let mut config = russh::client::Config::default();
        // 会话长期空闲是正常情况，不设不活动超时，由协议层心跳探测断线
        config.inactivity_timeout = None;
        config.keepalive_interval = Some(Duration::from_secs(30));
        config.keepalive_max = 3;
        config
    }
}

/// 解析端口，空字符串视为 22
pub fn parse_port(port: &str) -> Result<u16, SshError> {
    let port = port.trim();
    if port.is_empty() {
        return Ok(22);
    }
    port.parse::<u16>()
        .map_err(|_| SshError::Config(format!("invalid port: {}", port)))
}

/// 格式化 host:port；非 IPv4 的 IP 字面量使用 [host]:port
pub fn format_address(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => format!("[{}]:{}", host, port),
        _ => format!("{}:{}", host, port),
    }
}
