// TargetProfile 目标主机配置数据结构

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 文件传输方式
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// SFTP 子系统（默认）
    #[default]
    Sftp,
    /// SCP + shell 命令
    Scp,
}

impl TransferMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sftp => "sftp",
            Self::Scp => "scp",
        }
    }
}

/// 目标主机配置（持久化用）
///
/// `password` 在磁盘上保存为密文，内存中为明文；`key_path` 始终为明文。
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetProfile {
    pub id: String,
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub key_path: String,
    #[serde(default)]
    pub transfer_mode: TransferMode,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_port() -> String {
    "22".to_string()
}

impl Default for TargetProfile {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: String::new(),
            host: String::new(),
            port: default_port(),
            username: String::new(),
            password: String::new(),
            key_path: String::new(),
            transfer_mode: TransferMode::Sftp,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 认证凭据
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credential {
    /// 私钥文件路径
    KeyFile(PathBuf),
    /// 密码
    Password(String),
}

impl TargetProfile {
    /// 选择认证凭据：私钥优先于密码，两者都没有返回 None
    pub fn credential(&self) -> Option<Credential> {
        if !self.key_path.is_empty() {
            Some(Credential::KeyFile(PathBuf::from(&self.key_path)))
        } else if !self.password.is_empty() {
            Some(Credential::Password(self.password.clone()))
        } else {
            None
        }
    }

    /// 返回密码被遮盖的副本（用于列表展示）
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        if !copy.password.is_empty() {
            copy.password = "******".to_string();
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_file_wins_over_password() {
        let profile = TargetProfile {
            password: "p".into(),
            key_path: "/home/ops/.ssh/id_ed25519".into(),
            ..Default::default()
        };
        assert_eq!(
            profile.credential(),
            Some(Credential::KeyFile("/home/ops/.ssh/id_ed25519".into()))
        );
    }

    #[test]
    fn test_missing_credential() {
        assert_eq!(TargetProfile::default().credential(), None);
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{"id":"a","name":"web","host":"10.0.0.5","port":"2222",
            "username":"ops","password":"","keyPath":"","transferMode":"scp",
            "createdAt":"2024-01-01T00:00:00Z","updatedAt":"2024-01-02T00:00:00Z"}"#;
        let profile: TargetProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.transfer_mode, TransferMode::Scp);
        assert_eq!(profile.port, "2222");

        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["transferMode"], "scp");
        assert!(value.get("keyPath").is_some());
    }

    #[test]
    fn test_masked_hides_password_only() {
        let profile = TargetProfile {
            password: "secret".into(),
            host: "h".into(),
            ..Default::default()
        };
        let masked = profile.masked();
        assert_eq!(masked.password, "******");
        assert_eq!(masked.host, "h");
        assert_eq!(TargetProfile::default().masked().password, "");
    }
}
