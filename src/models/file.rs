// 远程文件与传输相关数据类型

use serde::{Deserialize, Serialize};

/// 文件条目
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// 文件名
    pub name: String,
    /// 完整路径（Unix 风格）
    pub path: String,
    /// 文件大小（字节）
    pub size: u64,
    /// 是否目录
    pub is_dir: bool,
    /// 权限字符串（如 drwxr-xr-x）
    pub mode: String,
    /// 修改时间（YYYY-MM-DD HH:MM:SS）
    pub mod_time: String,
}

/// 格式化 Unix 权限位为 ls 风格字符串
pub fn format_permissions(perms: u32, is_dir: bool, is_symlink: bool) -> String {
    let mut s = String::with_capacity(10);

    s.push(if is_dir {
        'd'
    } else if is_symlink {
        'l'
    } else {
        '-'
    });

    for shift in [6u32, 3, 0] {
        let bits = (perms >> shift) & 0o7;
        s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }

    s
}

/// 连接远程路径
pub fn join_remote_path(base: &str, name: &str) -> String {
    if base == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}

/// 取路径最后一段（本地或远程）
pub fn base_name(path: &str) -> String {
    let trimmed = path.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}

/// 传输进度
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub file_name: String,
    pub transferred: u64,
    pub total: u64,
    pub percentage: f64,
}

impl TransferProgress {
    pub fn new(file_name: impl Into<String>, transferred: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            100.0
        } else {
            transferred as f64 / total as f64 * 100.0
        };
        Self {
            file_name: file_name.into(),
            transferred,
            total,
            percentage,
        }
    }
}

/// 批量传输条目
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchItem {
    pub local: String,
    pub remote: String,
}

/// TCP 连通性探测结果
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub is_connected: bool,
    /// 延迟（毫秒）
    pub latency: u64,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_permissions() {
        assert_eq!(format_permissions(0o755, true, false), "drwxr-xr-x");
        assert_eq!(format_permissions(0o644, false, false), "-rw-r--r--");
        assert_eq!(format_permissions(0o777, false, true), "lrwxrwxrwx");
    }

    #[test]
    fn test_join_remote_path() {
        assert_eq!(join_remote_path("/", "etc"), "/etc");
        assert_eq!(join_remote_path("/home/ops/", "a.txt"), "/home/ops/a.txt");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("/home/ops/a.txt"), "a.txt");
        assert_eq!(base_name("C:\\Users\\ops\\b.log"), "b.log");
        assert_eq!(base_name("a.txt"), "a.txt");
        assert_eq!(base_name("/var/log/"), "log");
    }

    #[test]
    fn test_progress_percentage() {
        assert_eq!(TransferProgress::new("a", 50, 200).percentage, 25.0);
        assert_eq!(TransferProgress::new("empty", 0, 0).percentage, 100.0);
    }
}
