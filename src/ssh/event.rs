// 引擎事件定义
// 引擎 → 调用方（GUI 层）的单向事件流

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::models::TransferProgress;

/// 终端输出流
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// 批量传输方向
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchKind {
    Upload,
    Download,
}

/// 引擎事件
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// 终端输出片段
    TerminalOutput {
        config_id: String,
        output: String,
        stream: OutputStream,
    },
    /// 终端连接状态变化
    TerminalStatus { config_id: String, connected: bool },
    /// 上传进度
    UploadProgress(TransferProgress),
    /// 下载进度
    DownloadProgress(TransferProgress),
    /// 批量传输中单个文件失败
    BatchError {
        kind: BatchKind,
        file: String,
        error: String,
    },
    /// 批量传输中单个文件完成
    BatchComplete { kind: BatchKind, file: String },
    /// 批量传输结束
    BatchFinished { kind: BatchKind },
}

impl EngineEvent {
    /// 事件名
    pub fn name(&self) -> &'static str {
        match self {
            Self::TerminalOutput { .. } => "terminal-output",
            Self::TerminalStatus { .. } => "terminal-status",
            Self::UploadProgress(_) => "upload-progress",
            Self::DownloadProgress(_) => "download-progress",
            Self::BatchError { kind, .. } => match kind {
                BatchKind::Upload => "batch-upload-error",
                BatchKind::Download => "batch-download-error",
            },
            Self::BatchComplete { kind, .. } => match kind {
                BatchKind::Upload => "batch-upload-complete",
                BatchKind::Download => "batch-download-complete",
            },
            Self::BatchFinished { kind } => match kind {
                BatchKind::Upload => "batch-upload-finished",
                BatchKind::Download => "batch-download-finished",
            },
        }
    }

    /// 事件负载（JSON，camelCase）
    pub fn payload(&self) -> Value {
        match self {
            Self::TerminalOutput {
                config_id,
                output,
                stream,
            } => json!({
                "configId": config_id,
                "output": output,
                "type": stream.as_str(),
            }),
            Self::TerminalStatus {
                config_id,
                connected,
            } => json!({ "configId": config_id, "connected": connected }),
            Self::UploadProgress(progress) | Self::DownloadProgress(progress) => {
                serde_json::to_value(progress).unwrap_or(Value::Null)
            }
            Self::BatchError { file, error, .. } => json!({ "file": file, "error": error }),
            Self::BatchComplete { file, .. } => json!({ "file": file }),
            Self::BatchFinished { .. } => Value::Null,
        }
    }
}

/// 事件接收方
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// 通过 tokio mpsc 转发事件
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            debug!("[Event] Receiver dropped, event discarded");
        }
    }
}

/// 丢弃所有事件
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: EngineEvent) {}
}
