// 免密令牌
// 保存口令哈希和过期时间，证明近期输入过同一口令；不保存口令本身

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::crypto::hash_key;
use super::error::VaultError;

/// 令牌文件内容
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReauthToken {
    /// 32 字节随机数（十六进制）
    pub token: String,
    /// 口令的 SHA-256（十六进制）
    pub key_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ReauthToken {
    /// 为口令签发新令牌
    pub fn issue(passphrase: &str, ttl: Duration) -> Result<Self, VaultError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(VaultError::TtlOutOfRange)?;

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);

        Ok(Self {
            token: hex::encode(bytes),
            key_hash: hash_key(passphrase),
            created_at: now,
            expires_at,
        })
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// 口令是否与令牌匹配
    pub fn matches(&self, passphrase: &str) -> bool {
        hash_key(passphrase) == self.key_hash
    }

    /// 读取令牌文件；文件不存在返回 None
    pub async fn read(path: &Path) -> Result<Option<Self>, VaultError> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, VaultError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}
