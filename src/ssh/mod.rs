// SSH 会话引擎
//
// 模块结构:
// - config: 连接配置 (SshConfig, AuthMethod)
// - error: 错误类型 (SshError)
// - event: 引擎事件 (EngineEvent, EventSink)
// - handler: russh Handler 实现
// - client: 建立连接并认证
// - transport: 已认证连接 (Transport, RemoteShell)
// - shell: 路径转义与 sudo 包装
// - session: 会话 (Session, TeardownReport)
// - manager: 会话注册表 (SessionManager)
// - terminal: 交互式终端 (TerminalManager)

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod manager;
pub mod session;
pub mod shell;
pub mod terminal;
pub mod transport;

// 公开导出
pub use client::connect;
pub use config::{AuthMethod, SshConfig};
pub use error::SshError;
pub use event::{BatchKind, ChannelSink, EngineEvent, EventSink, NullSink, OutputStream};
pub use manager::SessionManager;
pub use session::{Session, TeardownReport};
pub use terminal::TerminalManager;
pub use transport::{CommandOutput, RemoteShell, Transport};
