// Web 终端辅助操作的返回结构
// 失败写在 success/error 字段里，调用方不需要区分错误类型

use serde::{Deserialize, Serialize};

use super::file::FileEntry;

/// 远端 shell 上下文
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub username: String,
    pub hostname: String,
    pub current_path: String,
}

/// 单条命令的执行结果
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,
    pub output: String,
    pub error: String,
    pub current_path: String,
    pub username: String,
    pub hostname: String,
}

impl CommandResult {
    pub fn succeeded(output: String, context: ConnectionInfo) -> Self {
        Self {
            success: true,
            output,
            error: String::new(),
            current_path: context.current_path,
            username: context.username,
            hostname: context.hostname,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Default::default()
        }
    }
}

/// 建立连接的结果
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResult {
    pub success: bool,
    pub error: String,
    pub connection_info: Option<ConnectionInfo>,
    pub welcome_message: String,
}

impl ConnectionResult {
    pub fn connected(info: ConnectionInfo) -> Self {
        Self {
            success: true,
            error: String::new(),
            welcome_message: format!("欢迎来到 {}@{}", info.username, info.hostname),
            connection_info: Some(info),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Default::default()
        }
    }
}

/// 补全条目类型
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemoteFileKind {
    File,
    Directory,
}

/// Tab 补全用的远程文件条目；目录名以 `/` 结尾
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RemoteFileKind,
    pub permissions: String,
    pub size: String,
}

impl From<&FileEntry> for RemoteFile {
    fn from(entry: &FileEntry) -> Self {
        let (name, kind) = if entry.is_dir {
            (format!("{}/", entry.name), RemoteFileKind::Directory)
        } else {
            (entry.name.clone(), RemoteFileKind::File)
        };
        Self {
            name,
            kind,
            permissions: entry.mode.clone(),
            size: entry.size.to_string(),
        }
    }
}

/// 补全列表结果
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FileListResult {
    pub success: bool,
    pub files: Vec<RemoteFile>,
    pub error: String,
}

impl FileListResult {
    pub fn listed(files: Vec<RemoteFile>) -> Self {
        Self {
            success: true,
            files,
            error: String::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, is_dir: bool) -> FileEntry {
        FileEntry {
            name: name.into(),
            path: format!("/srv/{}", name),
            size: 4096,
            is_dir,
            mode: if is_dir { "drwxr-xr-x" } else { "-rw-r--r--" }.into(),
            mod_time: "2024-05-01 10:22:00".into(),
        }
    }

    #[test]
    fn test_remote_file_from_entry() {
        let dir = RemoteFile::from(&entry("logs", true));
        assert_eq!(dir.name, "logs/");
        assert_eq!(dir.kind, RemoteFileKind::Directory);
        assert_eq!(dir.permissions, "drwxr-xr-x");
        assert_eq!(dir.size, "4096");

        let file = RemoteFile::from(&entry("app.log", false));
        assert_eq!(file.name, "app.log");
        assert_eq!(file.kind, RemoteFileKind::File);

        let value = serde_json::to_value(&dir).unwrap();
        assert_eq!(value["type"], "directory");
    }

    #[test]
    fn test_connection_result_welcome() {
        let result = ConnectionResult::connected(ConnectionInfo {
            username: "ops".into(),
            hostname: "web1".into(),
            current_path: "/home/ops".into(),
        });
        assert!(result.success);
        assert_eq!(result.welcome_message, "欢迎来到 ops@web1");

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["connectionInfo"]["currentPath"], "/home/ops");

        let failed = ConnectionResult::failed("refused");
        assert!(!failed.success);
        assert!(failed.connection_info.is_none());
    }
}
