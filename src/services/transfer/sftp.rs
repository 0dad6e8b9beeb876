// SFTP 传输 - 封装 russh-sftp 客户端

use std::path::Path;

use chrono::{DateTime, Local};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use super::Progress;
use crate::models::file::{format_permissions, join_remote_path};
use crate::models::FileEntry;
use crate::ssh::{SshError, Transport};

/// SFTP 传输
/// 持有一个 SFTP 子系统会话，流式复制并按块报告进度
pub struct SftpTransfer {
    sftp: SftpSession,
    chunk_size: usize,
}

impl SftpTransfer {
    /// 在传输上打开 SFTP 子系统
    pub async fn open(transport: &Transport, chunk_size: usize) -> Result<Self, SshError> {
        info!("[SFTP] Opening SFTP subsystem on {}", transport.label());
        let sftp = transport.open_sftp().await?;
        Ok(Self {
            sftp,
            chunk_size: chunk_size.max(1),
        })
    }

    /// 读取目录内容
    pub async fn list(&self, path: &str) -> Result<Vec<FileEntry>, SshError> {
        debug!("[SFTP] Reading directory: {}", path);

        let dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| SshError::Sftp(format!("Failed to read directory {}: {}", path, e)))?;

        let mut entries = Vec::new();
        for entry in dir {
            let name = entry.file_name();

            // 跳过 . 和 ..
            if name == "." || name == ".." {
                continue;
            }

            let full_path = join_remote_path(path, &name);
            entries.push(to_file_entry(name, full_path, &entry.metadata()));
        }

        debug!("[SFTP] Read {} entries from {}", entries.len(), path);
        Ok(entries)
    }

    /// 上传文件，每写出一块报告一次进度
    pub async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: Progress<'_>,
    ) -> Result<(), SshError> {
        info!("[SFTP] Uploading {:?} -> {}", local, remote);

        let mut src = tokio::fs::File::open(local).await?;
        let total = src.metadata().await?.len();

        let mut dst = self
            .sftp
            .create(remote)
            .await
            .map_err(|e| SshError::Sftp(format!("Failed to create {}: {}", remote, e)))?;

        let transferred =
            copy_with_progress(&mut src, &mut dst, self.chunk_size, total, progress).await?;
        dst.shutdown().await?;

        info!("[SFTP] Upload completed: {} ({} bytes)", remote, transferred);
        Ok(())
    }

    /// 下载文件；失败时删除不完整的本地文件
    pub async fn download(
        &self,
        remote: &str,
        local: &Path,
        progress: Progress<'_>,
    ) -> Result<(), SshError> {
        info!("[SFTP] Downloading {} -> {:?}", remote, local);

        let mut src = self
            .sftp
            .open(remote)
            .await
            .map_err(|e| SshError::Sftp(format!("Failed to open {}: {}", remote, e)))?;
        let total = src
            .metadata()
            .await
            .map_err(|e| SshError::Sftp(format!("Failed to stat {}: {}", remote, e)))?
            .size
            .unwrap_or(0);

        let mut dst = tokio::fs::File::create(local).await?;

        let result = async {
            let n = copy_with_progress(&mut src, &mut dst, self.chunk_size, total, progress).await?;
            dst.sync_all().await?;
            Ok::<_, SshError>(n)
        }
        .await;

        match result {
            Ok(n) => {
                info!("[SFTP] Download completed: {} ({} bytes)", remote, n);
                Ok(())
            }
            Err(e) => {
                error!("[SFTP] Download of {} failed: {}", remote, e);
                drop(dst);
                if let Err(rm) = tokio::fs::remove_file(local).await {
                    warn!("[SFTP] Failed to remove partial file {:?}: {}", local, rm);
                }
                Err(e)
            }
        }
    }

    /// 创建目录
    pub async fn mkdir(&self, path: &str) -> Result<(), SshError> {
        info!("[SFTP] Creating directory: {}", path);
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| SshError::Sftp(format!("Failed to create directory {}: {}", path, e)))
    }

    /// 删除文件（先确认存在）
    pub async fn remove(&self, path: &str) -> Result<(), SshError> {
        info!("[SFTP] Removing file: {}", path);
        self.ensure_exists(path).await?;
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| SshError::Sftp(format!("Failed to remove file {}: {}", path, e)))
    }

    /// 删除空目录（先确认存在）
    pub async fn remove_dir(&self, path: &str) -> Result<(), SshError> {
        info!("[SFTP] Removing directory: {}", path);
        self.ensure_exists(path).await?;
        self.sftp
            .remove_dir(path)
            .await
            .map_err(|e| SshError::Sftp(format!("Failed to remove directory {}: {}", path, e)))
    }

    async fn ensure_exists(&self, path: &str) -> Result<(), SshError> {
        self.sftp
            .metadata(path)
            .await
            .map(|_| ())
            .map_err(|e| {
                SshError::Sftp(format!("{} does not exist or is inaccessible: {}", path, e))
            })
    }

    /// 关闭 SFTP 子系统
    pub async fn close(&self) -> Result<(), SshError> {
        debug!("[SFTP] Closing SFTP session");
        self.sftp.close().await.map_err(SshError::from)
    }
}

/// 按块复制并报告进度；空文件也报告一次 (0, 0)
async fn copy_with_progress<R, W>(
    src: &mut R,
    dst: &mut W,
    chunk_size: usize,
    total: u64,
    progress: Progress<'_>,
) -> Result<u64, SshError>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_size];
    let mut transferred = 0u64;

    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n]).await?;
        transferred += n as u64;
        progress(transferred, total);
    }

    dst.flush().await?;
    if transferred == 0 {
        progress(0, total);
    }
    Ok(transferred)
}

/// 把 SFTP 属性转换为 FileEntry
fn to_file_entry(name: String, path: String, attrs: &FileAttributes) -> FileEntry {
    let is_dir = attrs.is_dir();
    let mod_time = attrs
        .mtime
        .and_then(|t| DateTime::from_timestamp(t as i64, 0))
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();

    FileEntry {
        name,
        path,
        size: attrs.size.unwrap_or(0),
        is_dir,
        mode: format_permissions(
            attrs.permissions.unwrap_or(0),
            is_dir,
            attrs.is_symlink(),
        ),
        mod_time,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[tokio::test]
    async fn test_copy_reports_each_chunk_and_ends_at_total() {
        let data = vec![7u8; 10];
        let mut src: &[u8] = &data;
        let mut dst = Vec::new();
        let seen = Mutex::new(Vec::new());
        let progress = |done: u64, total: u64| seen.lock().unwrap().push((done, total));

        let n = copy_with_progress(&mut src, &mut dst, 4, 10, &progress)
            .await
            .unwrap();

        assert_eq!(n, 10);
        assert_eq!(dst, data);
        assert_eq!(*seen.lock().unwrap(), vec![(4, 10), (8, 10), (10, 10)]);
    }

    #[tokio::test]
    async fn test_empty_file_reports_once() {
        let mut src: &[u8] = &[];
        let mut dst = Vec::new();
        let seen = Mutex::new(Vec::new());
        let progress = |done: u64, total: u64| seen.lock().unwrap().push((done, total));

        copy_with_progress(&mut src, &mut dst, 4, 0, &progress)
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(0, 0)]);
    }

    #[test]
    fn test_attributes_to_entry() {
        let mut attrs = FileAttributes::default();
        attrs.size = Some(42);
        attrs.permissions = Some(0o100640);
        attrs.mtime = None;

        let entry = to_file_entry("app.log".into(), "/var/log/app.log".into(), &attrs);
        assert_eq!(entry.size, 42);
        assert!(!entry.is_dir);
        assert_eq!(entry.mode, "-rw-r-----");
        assert_eq!(entry.mod_time, "");
    }
}
