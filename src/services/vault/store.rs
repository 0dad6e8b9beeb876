// 加密凭据库
// 记录文件为目标配置的 JSON 数组，其中 password 字段为密文

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::models::TargetProfile;

use super::crypto::{decrypt, encrypt};
use super::error::VaultError;
use super::reauth::ReauthToken;

const RECORDS_FILE: &str = "configs.enc";
const TOKEN_FILE: &str = "session.json";

/// 凭据库文件位置
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VaultPaths {
    pub records: PathBuf,
    pub token: PathBuf,
}

impl VaultPaths {
    /// 两个文件都放在同一目录下
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            records: dir.join(RECORDS_FILE),
            token: dir.join(TOKEN_FILE),
        }
    }
}

#[derive(Default)]
struct VaultState {
    key: Option<String>,
    profiles: Vec<TargetProfile>,
}

/// 加密凭据库
///
/// 内存中保存明文配置，落盘时只加密 password 字段。
/// 所有修改都先在副本上完成，写盘成功后才替换内存状态。
pub struct Vault {
    paths: VaultPaths,
    state: RwLock<VaultState>,
    /// 串行化令牌文件读写
    token_lock: Mutex<()>,
    reauth_ttl: Duration,
}

impl Vault {
    pub fn new(paths: VaultPaths) -> Self {
        Self {
            paths,
            state: RwLock::new(VaultState::default()),
            token_lock: Mutex::new(()),
            reauth_ttl: Duration::hours(24),
        }
    }

    pub fn with_reauth_ttl(mut self, ttl: Duration) -> Self {
        self.reauth_ttl = ttl;
        self
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    /// 设置口令；已有记录文件时立即用新口令解密
    ///
    /// 解密失败时保持原状态不变，错误即表示口令不对。
    pub async fn set_key(&self, key: &str) -> Result<(), VaultError> {
        let mut state = self.state.write().await;

        let profiles = if self.paths.records.exists() {
            read_records(&self.paths.records, key).await?
        } else {
            Vec::new()
        };

        state.key = Some(key.to_string());
        state.profiles = profiles;
        info!("[Vault] Key set, {} profiles loaded", state.profiles.len());
        Ok(())
    }

    /// 内存中是否持有口令
    pub async fn key_is_set(&self) -> bool {
        self.state.read().await.key.is_some()
    }

    /// 磁盘上是否已初始化（记录文件或令牌文件存在）
    pub fn is_initialized(&self) -> bool {
        self.paths.records.exists() || self.paths.token.exists()
    }

    /// 从磁盘重新加载并返回全部配置（明文）
    pub async fn load(&self) -> Result<Vec<TargetProfile>, VaultError> {
        let mut state = self.state.write().await;
        let key = state.key.clone().ok_or(VaultError::KeyNotSet)?;

        state.profiles = read_records(&self.paths.records, &key).await?;
        Ok(state.profiles.clone())
    }

    /// 将内存中的配置写盘
    pub async fn save(&self) -> Result<(), VaultError> {
        let state = self.state.write().await;
        let key = state.key.as_deref().ok_or(VaultError::KeyNotSet)?;
        write_records(&self.paths.records, key, &state.profiles).await
    }

    /// 按 ID 获取配置（明文）
    pub async fn get(&self, id: &str) -> Result<TargetProfile, VaultError> {
        self.state
            .read()
            .await
            .profiles
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(id.to_string()))
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.state.read().await.profiles.iter().any(|p| p.id == id)
    }

    /// 密码遮盖后的配置列表
    pub async fn list_masked(&self) -> Vec<TargetProfile> {
        self.state
            .read()
            .await
            .profiles
            .iter()
            .map(TargetProfile::masked)
            .collect()
    }

    pub async fn add(&self, profile: TargetProfile) -> Result<(), VaultError> {
        debug!("[Vault] Adding profile {}", profile.id);
        self.modify(|profiles| {
            profiles.push(profile);
            Ok(())
        })
        .await
    }

    pub async fn update(&self, profile: TargetProfile) -> Result<(), VaultError> {
        debug!("[Vault] Updating profile {}", profile.id);
        self.modify(|profiles| {
            let slot = profiles
                .iter_mut()
                .find(|p| p.id == profile.id)
                .ok_or_else(|| VaultError::NotFound(profile.id.clone()))?;
            *slot = profile;
            Ok(())
        })
        .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), VaultError> {
        debug!("[Vault] Deleting profile {}", id);
        self.modify(|profiles| {
            let index = profiles
                .iter()
                .position(|p| p.id == id)
                .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
            profiles.remove(index);
            Ok(())
        })
        .await
    }

    async fn modify<F>(&self, change: F) -> Result<(), VaultError>
    where
        F: FnOnce(&mut Vec<TargetProfile>) -> Result<(), VaultError>,
    {
        let mut state = self.state.write().await;
        let key = state.key.clone().ok_or(VaultError::KeyNotSet)?;

        let mut profiles = state.profiles.clone();
        change(&mut profiles)?;
        write_records(&self.paths.records, &key, &profiles).await?;

        state.profiles = profiles;
        Ok(())
    }

    // ======================== 免密令牌 ========================

    /// 为当前口令签发令牌并写盘
    pub async fn create_session(&self) -> Result<ReauthToken, VaultError> {
        let key = self
            .state
            .read()
            .await
            .key
            .clone()
            .ok_or(VaultError::KeyNotSet)?;

        let _guard = self.token_lock.lock().await;
        let token = ReauthToken::issue(&key, self.reauth_ttl)?;
        write_private(&self.paths.token, token.to_json()?).await?;

        info!("[Vault] Reauth token issued, expires at {}", token.expires_at);
        Ok(token)
    }

    /// 是否存在未过期的令牌；过期令牌顺手删除
    pub async fn has_valid_session(&self) -> bool {
        let _guard = self.token_lock.lock().await;

        match ReauthToken::read(&self.paths.token).await {
            Ok(Some(token)) if !token.is_expired() => true,
            Ok(Some(_)) => {
                info!("[Vault] Reauth token expired, removing");
                if let Err(e) = remove_if_exists(&self.paths.token).await {
                    warn!("[Vault] Failed to remove expired token: {}", e);
                }
                false
            }
            Ok(None) => false,
            Err(e) => {
                debug!("[Vault] Unreadable reauth token: {}", e);
                false
            }
        }
    }

    /// 用令牌校验口令，不读取记录文件
    pub async fn validate_key_with_session(&self, key: &str) -> Result<(), VaultError> {
        let _guard = self.token_lock.lock().await;

        let token = ReauthToken::read(&self.paths.token)
            .await?
            .ok_or(VaultError::NoSession)?;

        if !token.matches(key) {
            return Err(VaultError::KeyMismatch);
        }
        if token.is_expired() {
            return Err(VaultError::SessionExpired);
        }
        Ok(())
    }

    /// 删除令牌文件；文件不存在不算错误
    pub async fn clear_session(&self) -> Result<(), VaultError> {
        let _guard = self.token_lock.lock().await;
        remove_if_exists(&self.paths.token).await?;
        info!("[Vault] Reauth token cleared");
        Ok(())
    }
}

/// 读取并解密记录文件；文件不存在视为空
async fn read_records(path: &Path, key: &str) -> Result<Vec<TargetProfile>, VaultError> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut profiles: Vec<TargetProfile> = serde_json::from_slice(&data)?;
    for profile in &mut profiles {
        profile.password = decrypt(&profile.password, key)?;
    }
    Ok(profiles)
}

/// 加密并写入记录文件
async fn write_records(
    path: &Path,
    key: &str,
    profiles: &[TargetProfile],
) -> Result<(), VaultError> {
    let encrypted = profiles
        .iter()
        .map(|p| {
            let mut copy = p.clone();
            copy.password = encrypt(&p.password, key)?;
            Ok(copy)
        })
        .collect::<Result<Vec<_>, VaultError>>()?;

    let data = serde_json::to_vec_pretty(&encrypted)?;
    write_private(path, data).await?;
    debug!("[Vault] Wrote {} profiles to {:?}", encrypted.len(), path);
    Ok(())
}

/// 原子写入仅属主可读写的文件：同目录临时文件 + rename
async fn write_private(path: &Path, data: Vec<u8>) -> Result<(), VaultError> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<(), VaultError> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        tmp.persist(&path).map_err(|e| VaultError::Io(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| VaultError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

async fn remove_if_exists(path: &Path) -> Result<(), VaultError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
