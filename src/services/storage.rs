// 本地数据持久化服务

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::EngineSettings;
use crate::services::vault::VaultPaths;

const SETTINGS_FILE: &str = "settings.json";

/// 获取配置目录路径
/// macOS: ~/Library/Application Support/shellvault
/// Linux: ~/.config/shellvault
/// Windows: C:\Users\<用户名>\AppData\Roaming\shellvault
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("无法获取系统配置目录")?
        .join("shellvault");
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).context("无法创建配置目录")?;
    }
    Ok(config_dir)
}

/// 凭据库文件位置
pub fn vault_paths() -> Result<VaultPaths> {
    Ok(VaultPaths::in_dir(get_config_dir()?))
}

// ======================== Settings 配置持久化 ========================

/// 加载引擎设置，文件不存在时返回默认值
pub fn load_settings() -> Result<EngineSettings> {
    load_settings_from(&get_config_dir()?)
}

/// 保存引擎设置
pub fn save_settings(settings: &EngineSettings) -> Result<()> {
    save_settings_to(&get_config_dir()?, settings)
}

pub fn load_settings_from(dir: &Path) -> Result<EngineSettings> {
    let path = dir.join(SETTINGS_FILE);
    if !path.exists() {
        return Ok(EngineSettings::default());
    }
    let content = fs::read_to_string(&path).context("无法读取设置配置文件")?;
    let settings: EngineSettings =
        serde_json::from_str(&content).context("无法解析设置配置文件")?;
    Ok(settings)
}

pub fn save_settings_to(dir: &Path, settings: &EngineSettings) -> Result<()> {
    fs::create_dir_all(dir).context("无法创建配置目录")?;
    let content = serde_json::to_string_pretty(settings).context("无法序列化设置配置")?;
    fs::write(dir.join(SETTINGS_FILE), content).context("无法写入设置配置文件")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_settings_are_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            load_settings_from(dir.path()).unwrap(),
            EngineSettings::default()
        );
    }

    #[test]
    fn test_settings_persist() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = EngineSettings::default();
        settings.transfer.scratch_dir = "/var/tmp".into();
        settings.vault.reauth_ttl_hours = 8;

        save_settings_to(dir.path(), &settings).unwrap();
        assert_eq!(load_settings_from(dir.path()).unwrap(), settings);
    }

    #[test]
    fn test_corrupt_settings_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SETTINGS_FILE), "{").unwrap();
        let err = load_settings_from(dir.path()).unwrap_err();
        assert!(err.to_string().contains("无法解析设置配置文件"));
    }
}
