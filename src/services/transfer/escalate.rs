// sudo 提权传输
// 经共享中转目录暂存，再用 sudo 命令移动/复制到最终路径

use std::future::Future;

use tracing::{info, warn};

use crate::models::file::{base_name, join_remote_path};
use crate::ssh::shell::escape_shell_path;
use crate::ssh::{RemoteShell, SshError};

/// 提权执行器
pub struct Escalation<'a> {
    shell: &'a dyn RemoteShell,
    password: &'a str,
    scratch_dir: &'a str,
}

impl<'a> Escalation<'a> {
    pub fn new(shell: &'a dyn RemoteShell, password: &'a str, scratch_dir: &'a str) -> Self {
        Self {
            shell,
            password,
            scratch_dir,
        }
    }

    /// 中转路径：<scratch_dir>/<basename>
    pub fn scratch_path(&self, path: &str) -> String {
        join_remote_path(self.scratch_dir, &base_name(path))
    }

    async fn sudo(&self, command: String) -> Result<String, SshError> {
        self.shell.run_sudo(self.password, &command).await
    }

    /// 提权上传：先用 `put` 上传到中转路径，再 sudo mv 到目标
    pub async fn upload<F, Fut>(&self, local_name: &str, dest: &str, put: F) -> Result<(), SshError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<(), SshError>>,
    {
        let tmp = self.scratch_path(local_name);
        info!("[Sudo] Upload staged via {} -> {}", tmp, dest);

        put(tmp.clone()).await?;
        self.sudo(format!(
            "mv {} {}",
            escape_shell_path(&tmp),
            escape_shell_path(dest)
        ))
        .await?;
        Ok(())
    }

    /// 提权下载：sudo 复制到中转路径并放宽权限，用 `get` 下载，最后总是清理中转文件
    pub async fn download<F, Fut>(&self, src: &str, get: F) -> Result<(), SshError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<(), SshError>>,
    {
        let tmp = self.scratch_path(src);
        let tmp_escaped = escape_shell_path(&tmp);
        info!("[Sudo] Download staged via {} <- {}", tmp, src);

        let result = async {
            self.sudo(format!("cp {} {}", escape_shell_path(src), tmp_escaped))
                .await?;
            self.sudo(format!("chmod 644 {}", tmp_escaped)).await?;
            get(tmp.clone()).await
        }
        .await;

        // 中转文件属于 root，清理同样需要 sudo；失败只记录
        if let Err(e) = self.sudo(format!("rm -f {}", tmp_escaped)).await {
            warn!("[Sudo] Failed to clean up {}: {}", tmp, e);
        }

        result
    }

    pub async fn mkdir(&self, path: &str) -> Result<(), SshError> {
        info!("[Sudo] Creating directory: {}", path);
        self.sudo(format!("mkdir -p {}", escape_shell_path(path)))
            .await
            .map(|_| ())
    }

    pub async fn remove(&self, path: &str) -> Result<(), SshError> {
        info!("[Sudo] Removing file: {}", path);
        self.sudo(format!("rm -f {}", escape_shell_path(path)))
            .await
            .map(|_| ())
    }

    pub async fn remove_dir(&self, path: &str) -> Result<(), SshError> {
        info!("[Sudo] Removing directory: {}", path);
        self.sudo(format!("rm -rf {}", escape_shell_path(path)))
            .await
            .map(|_| ())
    }
}
