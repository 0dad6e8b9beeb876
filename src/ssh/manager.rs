use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{EngineSettings, SessionInfo, TargetProfile};

use super::error::SshError;
use super::session::{Session, TeardownReport};
use super::transport::RemoteShell;

/// 会话管理器
/// 每个目标配置 ID 至多一个活跃会话
pub struct SessionManager {
    /// 活跃会话映射表 (Profile ID -> Session)
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    /// 按 ID 串行化构建过程
    building: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// 引擎设置
    settings: EngineSettings,
}

impl SessionManager {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            building: Mutex::new(HashMap::new()),
            settings,
        }
    }

    /// 查找活跃会话
    async fn find_active(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(id)
            .filter(|s| s.is_active())
            .cloned()
    }

    async fn construction_lock(&self, id: &str) -> Arc<Mutex<()>> {
        self.building
            .lock()
            .await
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    /// 创建会话；已有活跃会话时原样返回
    pub async fn create(&self, profile: &TargetProfile) -> Result<Arc<Session>, SshError> {
        if let Some(existing) = self.find_active(&profile.id).await {
            return Ok(existing);
        }

        let lock = self.construction_lock(&profile.id).await;
        let result = {
            let _guard = lock.lock().await;
            self.build_and_register(profile).await
        };

        // 没有其他等待者时回收构建锁
        let mut building = self.building.lock().await;
        if building
            .get(&profile.id)
            .is_some_and(|l| Arc::ptr_eq(l, &lock) && Arc::strong_count(l) == 2)
        {
            building.remove(&profile.id);
        }

        result
    }

    async fn build_and_register(&self, profile: &TargetProfile) -> Result<Arc<Session>, SshError> {
        // 等锁期间可能已被其他调用者建好
        if let Some(existing) = self.find_active(&profile.id).await {
            return Ok(existing);
        }

        info!("[Session Manager] Creating session for {}", profile.id);
        let session = Arc::new(Session::establish(profile.clone(), &self.settings).await?);

        let mut sessions = self.sessions.write().await;
        let registered = sessions.get(&profile.id).filter(|s| s.is_active()).cloned();
        if let Some(existing) = registered {
            drop(sessions);
            warn!(
                "[Session Manager] Session {} already registered, discarding duplicate",
                profile.id
            );
            session.mark_inactive();
            session.teardown().await;
            return Ok(existing);
        }

        // 失效的旧会话被替换，后台释放
        if let Some(stale) = sessions.insert(profile.id.clone(), session.clone()) {
            stale.mark_inactive();
            tokio::spawn(async move {
                stale.teardown().await;
            });
        }
        drop(sessions);

        info!("[Session Manager] Session {} registered", profile.id);
        Ok(session)
    }

    /// 获取或创建会话
    pub async fn get_or_create(&self, profile: &TargetProfile) -> Result<Arc<Session>, SshError> {
        match self.get(&profile.id).await {
            Ok(session) => Ok(session),
            Err(_) => self.create(profile).await,
        }
    }

    /// 获取活跃会话
    pub async fn get(&self, id: &str) -> Result<Arc<Session>, SshError> {
        self.find_active(id)
            .await
            .ok_or_else(|| SshError::SessionNotFound(id.to_string()))
    }

    /// 关闭会话
    ///
    /// 先在写锁内标记失效并移出注册表，再在锁外逐步释放资源；
    /// 释放失败记录在返回的报告里，不影响移除。
    pub async fn close(&self, id: &str) -> Result<TeardownReport, SshError> {
        let session = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .remove(id)
                .ok_or_else(|| SshError::SessionNotFound(id.to_string()))?;
            session.mark_inactive();
            session
        };

        info!("[Session Manager] Closing session {}", id);
        let report = session.teardown().await;
        if report.is_clean() {
            info!("[Session Manager] Session {} closed", id);
        }
        Ok(report)
    }

    /// 并发关闭所有会话，返回最后一个错误
    pub async fn close_all(&self) -> Result<(), SshError> {
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        let closing: Vec<_> = ids.iter().map(|id| self.close(id)).collect();
        let results = futures::future::join_all(closing).await;
        let mut last_err = None;

        for result in results {
            match result {
                Ok(report) => {
                    if let Err(e) = report.into_result() {
                        last_err = Some(e);
                    }
                }
                // 并发关闭时可能已被移除
                Err(SshError::SessionNotFound(_)) => {}
                Err(e) => last_err = Some(e),
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 心跳：执行空命令，失败视为连接已断并关闭会话
    pub async fn keep_alive(&self, id: &str) -> Result<(), SshError> {
        let session = match self.get(id).await {
            Ok(session) => session,
            Err(e) => {
                self.reap(id).await;
                return Err(e);
            }
        };

        match session.transport().run("echo keepalive").await {
            Ok(_) => {
                debug!("[Session Manager] Keepalive ok for {}", id);
                Ok(())
            }
            Err(e) => {
                warn!("[Session Manager] Keepalive failed for {}: {}", id, e);
                drop(session);
                if let Err(close_err) = self.close(id).await {
                    debug!("[Session Manager] Session {} already gone: {}", id, close_err);
                }
                Err(e)
            }
        }
    }

    /// 注册表里仍有已失效的会话时将其关闭
    async fn reap(&self, id: &str) {
        let stale = self
            .sessions
            .read()
            .await
            .get(id)
            .is_some_and(|s| !s.is_active());
        if !stale {
            return;
        }

        info!("[Session Manager] Reaping dead session {}", id);
        if let Err(e) = self.close(id).await {
            debug!("[Session Manager] Session {} already gone: {}", id, e);
        }
    }

    /// 启动后台心跳任务；会话消失、心跳失败或令牌取消时退出
    pub fn start_keepalive(
        self: &Arc<Self>,
        id: &str,
        interval: Duration,
    ) -> CancellationToken {
        let token = CancellationToken::new();
        let child = token.clone();
        let manager = Arc::clone(self);
        let id = id.to_string();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一次 tick 立即返回
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if !manager.is_active(&id).await {
                    manager.reap(&id).await;
                    debug!("[Session Manager] Session {} gone, keepalive stopped", id);
                    break;
                }
                if manager.keep_alive(&id).await.is_err() {
                    break;
                }
            }
        });

        token
    }

    /// 活跃会话快照
    pub async fn active_sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_active())
            .map(|s| s.info())
            .collect()
    }

    /// 活跃会话数量
    pub async fn count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_active())
            .count()
    }

    pub async fn is_active(&self, id: &str) -> bool {
        self.find_active(id).await.is_some()
    }

    /// 会话运行时长
    pub async fn uptime(&self, id: &str) -> Result<Duration, SshError> {
        Ok(self.get(id).await?.uptime())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        let mut settings = EngineSettings::default();
        settings.connection.connection_timeout_secs = 2;
        SessionManager::new(settings)
    }

    #[tokio::test]
    async fn test_lookups_on_empty_registry() {
        let manager = manager();
        assert!(matches!(
            manager.get("t1").await,
            Err(SshError::SessionNotFound(_))
        ));
        assert!(matches!(
            manager.close("t1").await,
            Err(SshError::SessionNotFound(_))
        ));
        assert!(matches!(
            manager.keep_alive("t1").await,
            Err(SshError::SessionNotFound(_))
        ));
        assert!(manager.uptime("t1").await.is_err());
        assert!(!manager.is_active("t1").await);
        assert_eq!(manager.count().await, 0);
        assert!(manager.active_sessions().await.is_empty());
        assert!(manager.close_all().await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_create_registers_nothing() {
        let manager = manager();
        let profile = TargetProfile {
            id: "t1".into(),
            host: "127.0.0.1".into(),
            port: "22".into(),
            username: "ops".into(),
            ..Default::default()
        };

        let err = manager.create(&profile).await.err().unwrap();
        assert!(matches!(err, SshError::AuthConfig(_)));
        assert_eq!(manager.count().await, 0);
        assert!(manager.building.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_target_is_connect_error() {
        let manager = manager();
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let profile = TargetProfile {
            id: "t1".into(),
            host: "127.0.0.1".into(),
            port: port.to_string(),
            username: "ops".into(),
            password: "p".into(),
            ..Default::default()
        };

        let err = manager.get_or_create(&profile).await.err().unwrap();
        assert!(matches!(err, SshError::Connect(_)));
        assert!(manager.active_sessions().await.is_empty());
    }
}
