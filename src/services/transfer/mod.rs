// 文件传输能力
//
// 模块结构:
// - sftp: SFTP 子系统实现（流式进度）
// - scp: SCP 协议 + shell 命令实现（完成时报告进度）
// - ls: `ls -la` 输出解析
// - escalate: sudo 提权中转

pub mod escalate;
pub mod ls;
pub mod scp;
pub mod sftp;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::models::{FileEntry, TransferMode};
use crate::ssh::{SshError, Transport};

pub use escalate::Escalation;
pub use scp::ScpTransfer;
pub use sftp::SftpTransfer;

/// 进度回调 (已传输字节, 总字节)
pub type Progress<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// 传输能力的共享参数
pub struct TransferContext {
    /// 用于执行 sudo 命令的传输
    pub transport: Arc<Transport>,
    /// sudo 密码（目标配置中的密码，可为空）
    pub sudo_password: String,
    /// 提权中转目录
    pub scratch_dir: String,
    /// 复制块大小
    pub chunk_size: usize,
}

/// 传输变体，会话创建时确定
pub enum TransferKind {
    Sftp(SftpTransfer),
    Scp(ScpTransfer),
}

/// 文件传输能力
pub struct TransferCapability {
    kind: TransferKind,
    context: TransferContext,
}

impl TransferCapability {
    /// 按偏好模式构建
    pub async fn open(mode: TransferMode, context: TransferContext) -> Result<Self, SshError> {
        let kind = match mode {
            TransferMode::Sftp => TransferKind::Sftp(
                SftpTransfer::open(&context.transport, context.chunk_size).await?,
            ),
            TransferMode::Scp => TransferKind::Scp(ScpTransfer::new(
                context.transport.clone(),
                context.chunk_size,
            )),
        };
        info!(
            "[Transfer] {} capability ready on {}",
            mode.as_str(),
            context.transport.label()
        );
        Ok(Self { kind, context })
    }

    /// 当前模式
    pub fn mode(&self) -> TransferMode {
        match self.kind {
            TransferKind::Sftp(_) => TransferMode::Sftp,
            TransferKind::Scp(_) => TransferMode::Scp,
        }
    }

    fn escalation(&self) -> Escalation<'_> {
        Escalation::new(
            self.context.transport.as_ref(),
            &self.context.sudo_password,
            &self.context.scratch_dir,
        )
    }

    pub async fn list(&self, path: &str) -> Result<Vec<FileEntry>, SshError> {
        match &self.kind {
            TransferKind::Sftp(t) => t.list(path).await,
            TransferKind::Scp(t) => t.list(path).await,
        }
    }

    /// 上传；`escalate` 时经中转目录再 sudo mv
    pub async fn upload(
        &self,
        local: &Path,
        remote: &str,
        escalate: bool,
        progress: Progress<'_>,
    ) -> Result<(), SshError> {
        if !escalate {
            return self.put(local, remote, progress).await;
        }
        self.escalation()
            .upload(&local.to_string_lossy(), remote, |tmp| async move {
                self.put(local, &tmp, progress).await
            })
            .await
    }

    /// 下载；`escalate` 时先 sudo 复制到中转目录
    pub async fn download(
        &self,
        remote: &str,
        local: &Path,
        escalate: bool,
        progress: Progress<'_>,
    ) -> Result<(), SshError> {
        if !escalate {
            return self.get(remote, local, progress).await;
        }
        self.escalation()
            .download(remote, |tmp| async move {
                self.get(&tmp, local, progress).await
            })
            .await
    }

    pub async fn mkdir(&self, path: &str, escalate: bool) -> Result<(), SshError> {
        if escalate {
            return self.escalation().mkdir(path).await;
        }
        match &self.kind {
            TransferKind::Sftp(t) => t.mkdir(path).await,
            TransferKind::Scp(t) => t.mkdir(path).await,
        }
    }

    pub async fn remove(&self, path: &str, escalate: bool) -> Result<(), SshError> {
        if escalate {
            return self.escalation().remove(path).await;
        }
        match &self.kind {
            TransferKind::Sftp(t) => t.remove(path).await,
            TransferKind::Scp(t) => t.remove(path).await,
        }
    }

    pub async fn remove_dir(&self, path: &str, escalate: bool) -> Result<(), SshError> {
        if escalate {
            return self.escalation().remove_dir(path).await;
        }
        match &self.kind {
            TransferKind::Sftp(t) => t.remove_dir(path).await,
            TransferKind::Scp(t) => t.remove_dir(path).await,
        }
    }

    /// 释放传输资源（SCP 没有常驻通道）
    pub async fn close(&self) -> Result<(), SshError> {
        match &self.kind {
            TransferKind::Sftp(t) => t.close().await,
            TransferKind::Scp(_) => Ok(()),
        }
    }

    async fn put(
        &self,
        local: &Path,
        remote: &str,
        progress: Progress<'_>,
    ) -> Result<(), SshError> {
        match &self.kind {
            TransferKind::Sftp(t) => t.upload(local, remote, progress).await,
            TransferKind::Scp(t) => t.upload(local, remote, progress).await,
        }
    }

    async fn get(
        &self,
        remote: &str,
        local: &Path,
        progress: Progress<'_>,
    ) -> Result<(), SshError> {
        match &self.kind {
            TransferKind::Sftp(t) => t.download(remote, local, progress).await,
            TransferKind::Scp(t) => t.download(remote, local, progress).await,
        }
    }
}
