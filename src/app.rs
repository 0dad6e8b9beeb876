// 应用门面
// 把凭据库、会话管理器和终端管理器组合成对外的操作接口

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::file::base_name;
use crate::models::{
    BatchItem, CommandResult, ConnectionInfo, ConnectionResult, ConnectionStatus, EngineSettings,
    FileEntry, FileListResult, RemoteFile, SessionInfo, TargetProfile, TransferMode,
    TransferProgress,
};
use crate::services::storage;
use crate::services::transfer::ls::parse_ls_output;
use crate::services::vault::{Vault, VaultError, VaultPaths};
use crate::ssh::config::{format_address, parse_port};
use crate::ssh::shell::escape_shell_path;
use crate::ssh::{
    client, BatchKind, EngineEvent, EventSink, RemoteShell, Session, SessionManager, SshConfig,
    SshError, TerminalManager,
};

/// TCP 探测超时
const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// 应用门面
pub struct App {
    vault: Vault,
    sessions: Arc<SessionManager>,
    terminals: TerminalManager,
    sink: Arc<dyn EventSink>,
    settings: EngineSettings,
    /// 各会话的后台心跳任务
    keepalives: Mutex<HashMap<String, CancellationToken>>,
}

impl App {
    pub fn new(paths: VaultPaths, settings: EngineSettings, sink: Arc<dyn EventSink>) -> Self {
        if !settings.vault.reauth_ttl_in_range() {
            warn!(
                "[App] reauth_ttl_hours {} out of range, clamped to {}h",
                settings.vault.reauth_ttl_hours,
                settings.vault.reauth_ttl().num_hours()
            );
        }
        let vault = Vault::new(paths).with_reauth_ttl(settings.vault.reauth_ttl());
        let terminals = TerminalManager::new(sink.clone(), settings.terminal.clone());

        Self {
            vault,
            sessions: Arc::new(SessionManager::new(settings.clone())),
            terminals,
            sink,
            settings,
            keepalives: Mutex::new(HashMap::new()),
        }
    }

    /// 使用系统配置目录下的设置与凭据库
    pub fn from_config_dir(sink: Arc<dyn EventSink>) -> Result<Self> {
        let settings = storage::load_settings()?;
        let paths = storage::vault_paths()?;
        Ok(Self::new(paths, settings, sink))
    }

    // ======================== 口令管理 ========================

    /// 首次设置口令：写入空记录文件并签发令牌
    pub async fn set_encryption_key(&self, key: &str) -> Result<()> {
        self.vault.set_key(key).await.context("设置密钥失败")?;
        self.vault.save().await.context("创建配置文件失败")?;
        self.vault.create_session().await.context("创建会话失败")?;
        info!("[App] Encryption key set");
        Ok(())
    }

    /// 用口令解密已有记录，成功后采用并刷新令牌
    pub async fn verify_encryption_key(&self, key: &str) -> Result<()> {
        self.vault.set_key(key).await.context("密钥验证失败")?;
        self.vault.create_session().await.context("创建会话失败")?;
        info!("[App] Encryption key verified");
        Ok(())
    }

    pub fn is_key_set(&self) -> bool {
        self.vault.is_initialized()
    }

    pub async fn has_valid_session(&self) -> bool {
        self.vault.has_valid_session().await
    }

    /// 只确认令牌仍有效；口令仍需调用方提供
    pub async fn restore_session(&self) -> Result<()> {
        if !self.vault.has_valid_session().await {
            debug!("[App] No valid reauth token to restore");
            return Err(VaultError::NoSession).context("没有有效会话");
        }
        info!("[App] Reauth token is valid");
        Ok(())
    }

    pub async fn clear_session(&self) -> Result<()> {
        self.vault.clear_session().await.context("清除会话失败")
    }

    /// 先用令牌校验口令，再解密记录
    pub async fn verify_key_with_session(&self, key: &str) -> Result<()> {
        self.vault
            .validate_key_with_session(key)
            .await
            .context("会话验证失败")?;
        self.vault.set_key(key).await.context("设置密钥失败")?;
        Ok(())
    }

    // ======================== 配置管理 ========================

    /// 从磁盘重新加载全部配置
    pub async fn get_configs(&self) -> Result<Vec<TargetProfile>> {
        self.vault.load().await.context("加载配置失败")
    }

    pub async fn get_config(&self, id: &str) -> Result<TargetProfile> {
        self.vault
            .get(id)
            .await
            .with_context(|| format!("无法获取配置 {}", id))
    }

    pub async fn list_configs_masked(&self) -> Vec<TargetProfile> {
        self.vault.list_masked().await
    }

    /// 是否已保存过至少一个配置
    pub async fn has_configs(&self) -> bool {
        self.get_configs().await.is_ok_and(|configs| !configs.is_empty())
    }

    /// 保存配置：ID 为空时生成新 ID；已存在则更新并保留创建时间
    pub async fn save_config(&self, mut profile: TargetProfile) -> Result<TargetProfile> {
        if profile.id.is_empty() {
            profile.id = uuid::Uuid::new_v4().to_string();
        }
        profile.updated_at = Utc::now();

        match self.vault.get(&profile.id).await {
            Ok(existing) => {
                debug!("[App] Updating profile {}", profile.id);
                profile.created_at = existing.created_at;
                self.vault
                    .update(profile.clone())
                    .await
                    .context("更新配置失败")?;
            }
            Err(_) => {
                debug!("[App] Adding profile {}", profile.id);
                self.vault.add(profile.clone()).await.context("添加配置失败")?;
            }
        }
        Ok(profile)
    }

    /// 删除配置，同时关闭相关会话
    pub async fn delete_config(&self, id: &str) -> Result<()> {
        if let Err(e) = self.close_session(id).await {
            debug!("[App] No session to close for {}: {:#}", id, e);
        }
        self.vault
            .delete(id)
            .await
            .with_context(|| format!("删除配置失败 {}", id))
    }

    // ======================== 会话管理 ========================

    async fn session_for(&self, id: &str) -> Result<Arc<Session>> {
        let profile = self.get_config(id).await?;
        self.sessions
            .get_or_create(&profile)
            .await
            .with_context(|| format!("无法建立会话 {}", id))
    }

    async fn active_session(&self, id: &str) -> Result<Arc<Session>> {
        Ok(self.sessions.get(id).await?)
    }

    pub async fn create_session(&self, id: &str) -> Result<SessionInfo> {
        let profile = self.get_config(id).await?;
        let session = self
            .sessions
            .create(&profile)
            .await
            .with_context(|| format!("无法建立会话 {}", id))?;
        Ok(session.info())
    }

    /// 关闭会话及其终端与心跳
    pub async fn close_session(&self, id: &str) -> Result<()> {
        if let Some(token) = self.keepalives.lock().await.remove(id) {
            token.cancel();
        }
        if self.terminals.close(id).await.is_ok() {
            debug!("[App] Terminal {} closed with session", id);
        }

        let report = self.sessions.close(id).await?;
        if !report.is_clean() {
            warn!(
                "[App] Session {} closed with {} teardown failures",
                id,
                report.failures().len()
            );
        }
        Ok(())
    }

    pub async fn active_sessions(&self) -> Vec<SessionInfo> {
        self.sessions.active_sessions().await
    }

    pub async fn is_session_active(&self, id: &str) -> bool {
        self.sessions.is_active(id).await
    }

    pub async fn session_uptime(&self, id: &str) -> Result<Duration> {
        Ok(self.sessions.uptime(id).await?)
    }

    /// 启动后台心跳；间隔为 0 时不启动
    pub async fn start_keepalive(&self, id: &str) -> Result<()> {
        let secs = self.settings.connection.keepalive_interval_secs;
        if secs == 0 {
            return Ok(());
        }
        self.active_session(id).await?;

        let token = self
            .sessions
            .start_keepalive(id, Duration::from_secs(secs));
        if let Some(previous) = self.keepalives.lock().await.insert(id.to_string(), token) {
            previous.cancel();
        }
        info!("[App] Keepalive started for {} every {}s", id, secs);
        Ok(())
    }

    // ======================== 命令执行 ========================

    /// 在已有会话上执行命令，返回合并输出
    pub async fn execute_command(&self, id: &str, command: &str) -> Result<String> {
        let session = self.active_session(id).await?;
        Ok(session.transport().run(command).await?)
    }

    /// 以 sudo 执行命令，密码取自目标配置
    pub async fn execute_sudo_command(&self, id: &str, command: &str) -> Result<String> {
        let profile = self.get_config(id).await?;
        let session = self.active_session(id).await?;
        Ok(session
            .transport()
            .run_sudo(&profile.password, command)
            .await?)
    }

    pub async fn get_remote_home(&self, id: &str) -> Result<String> {
        let session = self.session_for(id).await?;
        let output = session.transport().run("pwd").await?;
        Ok(output.trim_end().to_string())
    }

    // ======================== Web 终端 ========================

    /// 执行命令并附带当前目录、用户名和主机名；命令失败写在结果里
    pub async fn execute_ssh_command(&self, id: &str, command: &str) -> Result<CommandResult> {
        let session = self.active_session(id).await?;
        let transport = session.transport();

        match transport.run(command).await {
            Ok(output) => {
                let context = shell_context(transport.as_ref()).await;
                Ok(CommandResult::succeeded(output, context))
            }
            Err(e) => {
                debug!("[App] Command on {} failed: {}", id, e);
                Ok(CommandResult::failed(e.to_string()))
            }
        }
    }

    /// 获取或建立会话并返回远端上下文；连接失败写在结果里
    pub async fn connect_ssh(&self, id: &str) -> Result<ConnectionResult> {
        let profile = self.get_config(id).await?;
        let session = match self.sessions.get_or_create(&profile).await {
            Ok(session) => session,
            Err(e) => {
                warn!("[App] Connect to {} failed: {}", id, e);
                return Ok(ConnectionResult::failed(e.to_string()));
            }
        };

        let info = shell_context(session.transport().as_ref()).await;
        info!("[App] Connected to {} as {}@{}", id, info.username, info.hostname);
        Ok(ConnectionResult::connected(info))
    }

    pub async fn disconnect_ssh(&self, id: &str) -> Result<()> {
        self.close_session(id).await
    }

    /// Tab 补全用的目录列表；路径为空时列当前目录
    pub async fn get_remote_files(&self, id: &str, path: &str) -> FileListResult {
        let session = match self.active_session(id).await {
            Ok(session) => session,
            Err(e) => return FileListResult::failed(format!("{:#}", e)),
        };

        let path = if path.is_empty() { "." } else { path };
        let command = format!("ls -la --time-style=long-iso {}", escape_shell_path(path));
        match session.transport().run(&command).await {
            Ok(output) => {
                let files = parse_ls_output(&output, path)
                    .iter()
                    .map(RemoteFile::from)
                    .collect();
                FileListResult::listed(files)
            }
            Err(e) => {
                debug!("[App] Listing {} on {} failed: {}", path, id, e);
                FileListResult::failed(e.to_string())
            }
        }
    }

    // ======================== 文件操作 ========================

    pub async fn list_remote_files(&self, id: &str, path: &str) -> Result<Vec<FileEntry>> {
        let session = self.session_for(id).await?;
        Ok(session.transfer().list(path).await?)
    }

    pub async fn create_remote_directory(
        &self,
        id: &str,
        path: &str,
        escalate: bool,
    ) -> Result<()> {
        let session = self.session_for(id).await?;
        Ok(session.transfer().mkdir(path, escalate).await?)
    }

    pub async fn delete_remote_file(&self, id: &str, path: &str, escalate: bool) -> Result<()> {
        let session = self.session_for(id).await?;
        Ok(session.transfer().remove(path, escalate).await?)
    }

    pub async fn delete_remote_directory(
        &self,
        id: &str,
        path: &str,
        escalate: bool,
    ) -> Result<()> {
        let session = self.session_for(id).await?;
        Ok(session.transfer().remove_dir(path, escalate).await?)
    }

    // ======================== 文件传输 ========================

    /// 上传文件，进度以 upload-progress 事件发出
    pub async fn upload_file(
        &self,
        id: &str,
        local: &str,
        remote: &str,
        escalate: bool,
    ) -> Result<()> {
        let session = self.session_for(id).await?;
        let local_path = Path::new(local);
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| local.to_string());

        let sink = self.sink.clone();
        let progress = move |transferred: u64, total: u64| {
            sink.emit(EngineEvent::UploadProgress(TransferProgress::new(
                file_name.clone(),
                transferred,
                total,
            )));
        };

        session
            .transfer()
            .upload(local_path, remote, escalate, &progress)
            .await
            .with_context(|| format!("上传失败 {} -> {}", local, remote))
    }

    /// 下载文件，进度以 download-progress 事件发出
    pub async fn download_file(
        &self,
        id: &str,
        remote: &str,
        local: &str,
        escalate: bool,
    ) -> Result<()> {
        let session = self.session_for(id).await?;
        let file_name = base_name(remote);

        let sink = self.sink.clone();
        let progress = move |transferred: u64, total: u64| {
            sink.emit(EngineEvent::DownloadProgress(TransferProgress::new(
                file_name.clone(),
                transferred,
                total,
            )));
        };

        session
            .transfer()
            .download(remote, Path::new(local), escalate, &progress)
            .await
            .with_context(|| format!("下载失败 {} -> {}", remote, local))
    }

    /// 批量上传；单个失败不影响其余文件
    pub async fn batch_upload_files(&self, id: &str, items: &[BatchItem], escalate: bool) {
        for item in items {
            let result = self
                .upload_file(id, &item.local, &item.remote, escalate)
                .await;
            self.emit_batch_result(BatchKind::Upload, &item.local, result);
        }
        self.sink.emit(EngineEvent::BatchFinished {
            kind: BatchKind::Upload,
        });
    }

    /// 批量下载；单个失败不影响其余文件
    pub async fn batch_download_files(&self, id: &str, items: &[BatchItem], escalate: bool) {
        for item in items {
            let result = self
                .download_file(id, &item.remote, &item.local, escalate)
                .await;
            self.emit_batch_result(BatchKind::Download, &item.remote, result);
        }
        self.sink.emit(EngineEvent::BatchFinished {
            kind: BatchKind::Download,
        });
    }

    fn emit_batch_result(&self, kind: BatchKind, file: &str, result: Result<()>) {
        let event = match result {
            Ok(()) => EngineEvent::BatchComplete {
                kind,
                file: file.to_string(),
            },
            Err(e) => {
                warn!("[App] Batch transfer of {} failed: {:#}", file, e);
                EngineEvent::BatchError {
                    kind,
                    file: file.to_string(),
                    error: format!("{:#}", e),
                }
            }
        };
        self.sink.emit(event);
    }

    // ======================== 连接测试 ========================

    /// TCP 端口探测，失败体现在返回值里而不是错误
    pub async fn check_connection(&self, id: &str) -> Result<ConnectionStatus> {
        let profile = self.get_config(id).await?;
        let port = parse_port(&profile.port)?;
        let address = format_address(profile.host.trim(), port);

        let start = Instant::now();
        let status = match tokio::time::timeout(CHECK_TIMEOUT, TcpStream::connect(&address)).await
        {
            Ok(Ok(_stream)) => ConnectionStatus {
                is_connected: true,
                latency: start.elapsed().as_millis() as u64,
                error: String::new(),
            },
            Ok(Err(e)) => ConnectionStatus {
                error: e.to_string(),
                ..Default::default()
            },
            Err(_) => ConnectionStatus {
                error: format!("connection to {} timed out", address),
                ..Default::default()
            },
        };

        debug!(
            "[App] Reachability of {}: connected={} latency={}ms",
            address, status.is_connected, status.latency
        );
        Ok(status)
    }

    /// 独立建立一次连接并执行测试命令，不进入会话注册表
    pub async fn test_ssh_connection(&self, id: &str) -> Result<()> {
        let profile = self.get_config(id).await?;
        let config = SshConfig::from_profile(&profile, &self.settings)?;
        let transport = client::connect(&config).await?;

        let result = transport.run("echo 'test'").await;
        if let Err(e) = transport.close().await {
            warn!("[App] Failed to close test connection: {}", e);
        }
        result.map(|_| ()).context("测试命令执行失败")
    }

    /// 有会话时返回实际模式，否则返回配置中的偏好
    pub async fn get_transfer_mode(&self, id: &str) -> Result<TransferMode> {
        match self.sessions.get(id).await {
            Ok(session) => Ok(session.transfer_mode()),
            Err(_) => Ok(self.get_config(id).await?.transfer_mode),
        }
    }

    // ======================== 终端 ========================

    /// 先在普通通道上跑一条测试命令，确认连接可用再申请 PTY
    pub async fn open_terminal(&self, id: &str) -> Result<()> {
        let session = self.active_session(id).await?;
        let transport = session.transport();
        transport
            .run("echo 'connection test'")
            .await
            .context("SSH连接功能异常")?;
        debug!("[App] Connection test passed for {}", id);

        self.terminals
            .open(id, &transport)
            .await
            .with_context(|| format!("无法打开终端 {}", id))
    }

    pub async fn send_terminal_input(&self, id: &str, input: &str) -> Result<()> {
        Ok(self.terminals.send(id, input.as_bytes()).await?)
    }

    pub async fn resize_terminal(&self, id: &str, cols: u32, rows: u32) -> Result<()> {
        Ok(self.terminals.resize(id, cols, rows).await?)
    }

    pub async fn close_terminal(&self, id: &str) -> Result<()> {
        Ok(self.terminals.close(id).await?)
    }

    // ======================== 退出 ========================

    /// 关闭全部终端与会话
    pub async fn shutdown(&self) {
        for (_, token) in self.keepalives.lock().await.drain() {
            token.cancel();
        }
        self.terminals.close_all().await;

        if let Err(e) = self.sessions.close_all().await {
            warn!("[App] Failed to close sessions cleanly: {}", e);
        }
        info!("[App] Shutdown complete");
    }
}

/// 读取远端当前目录、用户名和主机名；单项失败留空
async fn shell_context(shell: &dyn RemoteShell) -> ConnectionInfo {
    let (current_path, username, hostname) = tokio::join!(
        trimmed_output(shell, "pwd"),
        trimmed_output(shell, "whoami"),
        trimmed_output(shell, "hostname"),
    );
    ConnectionInfo {
        username,
        hostname,
        current_path,
    }
}

async fn trimmed_output(shell: &dyn RemoteShell, command: &str) -> String {
    match shell.run(command).await {
        Ok(output) => output.trim().to_string(),
        Err(e) => {
            debug!("[App] `{}` failed: {}", command, e);
            String::new()
        }
    }
}

/// 错误是否为会话不存在
pub fn is_session_not_found(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<SshError>(),
        Some(SshError::SessionNotFound(_))
    )
}
