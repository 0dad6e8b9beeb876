// SSH 会话
// 一个目标配置对应的连接 + 文件传输能力

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::models::{EngineSettings, SessionInfo, TargetProfile, TransferMode};
use crate::services::transfer::{TransferCapability, TransferContext};

use super::client;
use super::config::SshConfig;
use super::error::SshError;
use super::transport::Transport;

/// 会话（连接建立且传输能力就绪后才会创建）
pub struct Session {
    /// 目标配置快照
    profile: TargetProfile,
    /// 共享传输
    transport: Arc<Transport>,
    /// 文件传输能力
    transfer: TransferCapability,
    /// 连接时间
    connected_at: DateTime<Utc>,
    /// 单调时钟起点（用于运行时长）
    started: Instant,
    /// 活跃状态
    active: AtomicBool,
}

impl Session {
    /// 建立会话：连接、认证、构建传输能力
    ///
    /// 传输能力构建失败时关闭已建立的连接再返回错误。
    pub async fn establish(
        profile: TargetProfile,
        settings: &EngineSettings,
    ) -> Result<Self, SshError> {
        let config = SshConfig::from_profile(&profile, settings)?;
        let transport = Arc::new(client::connect(&config).await?);

        let context = TransferContext {
            transport: transport.clone(),
            sudo_password: profile.password.clone(),
            scratch_dir: settings.transfer.scratch_dir.clone(),
            chunk_size: settings.transfer.chunk_size,
        };

        let transfer = match TransferCapability::open(profile.transfer_mode, context).await {
            Ok(transfer) => transfer,
            Err(e) => {
                warn!(
                    "[Session] Transfer setup failed for {}, closing transport: {}",
                    profile.id, e
                );
                if let Err(close_err) = transport.close().await {
                    warn!("[Session] Failed to close transport: {}", close_err);
                }
                return Err(e);
            }
        };

        info!(
            "[Session] Session {} established ({})",
            profile.id,
            transfer.mode().as_str()
        );

        Ok(Self {
            profile,
            transport,
            transfer,
            connected_at: Utc::now(),
            started: Instant::now(),
            active: AtomicBool::new(true),
        })
    }

    /// 会话 ID（即目标配置 ID）
    pub fn id(&self) -> &str {
        &self.profile.id
    }

    pub fn transport(&self) -> Arc<Transport> {
        self.transport.clone()
    }

    pub fn transfer(&self) -> &TransferCapability {
        &self.transfer
    }

    pub fn transfer_mode(&self) -> TransferMode {
        self.transfer.mode()
    }

    /// 运行时长
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// 检查会话是否活跃
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && !self.transport.is_closed()
    }

    /// 标记会话关闭
    pub fn mark_inactive(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// 描述信息快照
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.profile.id.clone(),
            config_id: self.profile.id.clone(),
            config_name: self.profile.name.clone(),
            host: self.profile.host.clone(),
            connected_at: self.connected_at,
            is_active: self.is_active(),
        }
    }

    /// 逐步释放资源，每一步独立尝试
    pub async fn teardown(&self) -> TeardownReport {
        let mut report = TeardownReport::new(self.id());

        if let Err(e) = self.transfer.close().await {
            report.record("transfer", e);
        }
        if let Err(e) = self.transport.close().await {
            report.record("transport", e);
        }

        report
    }
}

/// 关闭过程中各步骤的失败记录
#[derive(Debug)]
pub struct TeardownReport {
    session_id: String,
    failures: Vec<(&'static str, SshError)>,
}

impl TeardownReport {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            failures: Vec::new(),
        }
    }

    /// 记录一个失败步骤（同时写日志）
    pub fn record(&mut self, step: &'static str, error: SshError) {
        warn!(
            "[Session] Failed to close {} of session {}: {}",
            step, self.session_id, error
        );
        self.failures.push((step, error));
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[(&'static str, SshError)] {
        &self.failures
    }

    /// 最后一个失败转换为错误
    pub fn into_result(mut self) -> Result<(), SshError> {
        match self.failures.pop() {
            Some((_, e)) => Err(e),
            None => Ok(()),
        }
    }
}
