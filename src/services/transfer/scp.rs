// SCP 传输
// 在 exec 通道上运行远端 `scp -t` / `scp -f`，自行实现 SCP 的 source/sink 协议；
// 目录和删除操作通过 shell 命令完成。

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::ls::parse_ls_output;
use super::Progress;
use crate::models::file::base_name;
use crate::models::FileEntry;
use crate::ssh::shell::escape_shell_path;
use crate::ssh::{RemoteShell, SshError, Transport};

/// 控制行最大长度
const MAX_LINE: usize = 4096;

/// SCP 传输
pub struct ScpTransfer {
    transport: Arc<Transport>,
    chunk_size: usize,
}

impl ScpTransfer {
    pub fn new(transport: Arc<Transport>, chunk_size: usize) -> Self {
        info!("[SCP] Transfer ready on {}", transport.label());
        Self {
            transport,
            chunk_size: chunk_size.max(1),
        }
    }

    /// 打开 exec 通道并转为字节流
    async fn open_exec(
        &self,
        command: &str,
    ) -> Result<russh::ChannelStream<russh::client::Msg>, SshError> {
        let channel = self.transport.open_channel().await?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;
        Ok(channel.into_stream())
    }

    /// 通过 `ls -la` 列目录
    pub async fn list(&self, path: &str) -> Result<Vec<FileEntry>, SshError> {
        debug!("[SCP] Listing directory: {}", path);
        let output = self
            .transport
            .run(&format!(
                "ls -la --time-style=long-iso {}",
                escape_shell_path(path)
            ))
            .await?;

        let entries = parse_ls_output(&output, path);
        debug!("[SCP] Read {} entries from {}", entries.len(), path);
        Ok(entries)
    }

    /// 上传，完成后报告一次进度
    pub async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: Progress<'_>,
    ) -> Result<(), SshError> {
        info!("[SCP] Uploading {:?} -> {}", local, remote);

        let mut file = tokio::fs::File::open(local).await?;
        let metadata = file.metadata().await?;
        let total = metadata.len();
        let name = base_name(&local.to_string_lossy());

        let mut stream = self
            .open_exec(&format!("scp -t {}", escape_shell_path(remote)))
            .await?;
        send_file(
            &mut stream,
            &mut file,
            &name,
            total,
            file_mode(&metadata),
            self.chunk_size,
        )
        .await?;
        stream.shutdown().await?;

        progress(total, total);
        info!("[SCP] Upload completed: {} ({} bytes)", remote, total);
        Ok(())
    }

    /// 下载，完成后报告一次进度；失败时删除不完整的本地文件
    pub async fn download(
        &self,
        remote: &str,
        local: &Path,
        progress: Progress<'_>,
    ) -> Result<(), SshError> {
        info!("[SCP] Downloading {} -> {:?}", remote, local);

        let mut stream = self
            .open_exec(&format!("scp -f {}", escape_shell_path(remote)))
            .await?;
        let mut file = tokio::fs::File::create(local).await?;

        let result = async {
            let size = receive_file(&mut stream, &mut file).await?;
            file.sync_all().await?;
            Ok::<_, SshError>(size)
        }
        .await;

        let _ = stream.shutdown().await;

        match result {
            Ok(size) => {
                progress(size, size);
                info!("[SCP] Download completed: {} ({} bytes)", remote, size);
                Ok(())
            }
            Err(e) => {
                drop(file);
                if let Err(rm) = tokio::fs::remove_file(local).await {
                    warn!("[SCP] Failed to remove partial file {:?}: {}", local, rm);
                }
                Err(e)
            }
        }
    }

    pub async fn mkdir(&self, path: &str) -> Result<(), SshError> {
        info!("[SCP] Creating directory: {}", path);
        self.transport
            .run(&format!("mkdir -p {}", escape_shell_path(path)))
            .await
            .map(|_| ())
    }

    pub async fn remove(&self, path: &str) -> Result<(), SshError> {
        info!("[SCP] Removing file: {}", path);
        self.transport
            .run(&format!("rm -f {}", escape_shell_path(path)))
            .await
            .map(|_| ())
    }

    pub async fn remove_dir(&self, path: &str) -> Result<(), SshError> {
        info!("[SCP] Removing directory: {}", path);
        self.transport
            .run(&format!("rm -rf {}", escape_shell_path(path)))
            .await
            .map(|_| ())
    }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

// ======================== SCP 协议 ========================

/// 读取一个应答字节：0 成功，1/2 后跟错误消息行
async fn read_ack<S>(stream: &mut S) -> Result<(), SshError>
where
    S: AsyncRead + Unpin,
{
    let code = stream.read_u8().await?;
    match code {
        0 => Ok(()),
        1 | 2 => {
            let message = read_line(stream).await?;
            Err(SshError::Transfer(format!("scp: {}", message.trim_end())))
        }
        other => Err(SshError::Transfer(format!(
            "scp: unexpected response byte {}",
            other
        ))),
    }
}

/// 读取一行（不含换行符）
async fn read_line<S>(stream: &mut S) -> Result<String, SshError>
where
    S: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        let byte = stream.read_u8().await?;
        if byte == b'\n' {
            break;
        }
        if line.len() >= MAX_LINE {
            return Err(SshError::Transfer("scp: control line too long".into()));
        }
        line.push(byte);
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

/// source 端：把 `source` 中的 `size` 字节作为单个文件发送给远端 `scp -t`
pub async fn send_file<S, R>(
    stream: &mut S,
    source: &mut R,
    name: &str,
    size: u64,
    mode: u32,
    chunk_size: usize,
) -> Result<u64, SshError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    read_ack(stream).await?;

    let header = format!("C{:04o} {} {}\n", mode & 0o7777, size, name);
    stream.write_all(header.as_bytes()).await?;
    stream.flush().await?;
    read_ack(stream).await?;

    let mut buf = vec![0u8; chunk_size];
    let mut sent = 0u64;
    while sent < size {
        let want = ((size - sent) as usize).min(buf.len());
        let n = source.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(SshError::Transfer(format!(
                "local file shrank during upload ({} of {} bytes)",
                sent, size
            )));
        }
        stream.write_all(&buf[..n]).await?;
        sent += n as u64;
    }

    stream.write_all(&[0]).await?;
    stream.flush().await?;
    read_ack(stream).await?;
    Ok(sent)
}

/// sink 端：从远端 `scp -f` 接收单个文件写入 `sink`，返回字节数
pub async fn receive_file<S, W>(stream: &mut S, sink: &mut W) -> Result<u64, SshError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    stream.write_all(&[0]).await?;
    stream.flush().await?;

    let size = loop {
        let code = stream.read_u8().await?;
        let line = read_line(stream).await?;
        match code {
            b'C' => break parse_file_header(&line)?,
            // 时间戳行（-p），直接确认
            b'T' => {
                stream.write_all(&[0]).await?;
                stream.flush().await?;
            }
            1 | 2 => return Err(SshError::Transfer(format!("scp: {}", line.trim_end()))),
            b'D' => {
                return Err(SshError::Transfer(
                    "scp: remote path is a directory".to_string(),
                ))
            }
            other => {
                return Err(SshError::Transfer(format!(
                    "scp: unexpected control record {:?}",
                    other as char
                )))
            }
        }
    };

    stream.write_all(&[0]).await?;
    stream.flush().await?;

    let mut body = (&mut *stream).take(size);
    let received = tokio::io::copy(&mut body, sink).await?;
    if received != size {
        return Err(SshError::Transfer(format!(
            "scp: connection closed after {} of {} bytes",
            received, size
        )));
    }
    sink.flush().await?;

    read_ack(stream).await?;
    stream.write_all(&[0]).await?;
    stream.flush().await?;
    Ok(size)
}

/// 解析 "0644 <size> <name>"（首字节 C 已被读走）
fn parse_file_header(line: &str) -> Result<u64, SshError> {
    let mut parts = line.splitn(3, ' ');
    let _mode = parts.next();
    parts
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| SshError::Transfer(format!("scp: malformed header {:?}", line)))
}
