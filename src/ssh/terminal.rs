// 交互式终端
//
// 每个目标配置至多一个 PTY shell。工作任务独占 russh 通道，
// 复用控制消息（输入/调整大小/关闭）和通道消息；
// 通道输出写入两条内存管道，由两个读取任务按块发出 terminal-output 事件；
// 监督任务等待全部结束后发出 terminal-status{connected:false} 并注销。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use russh::client::Msg;
use russh::{Channel, ChannelMsg, Pty};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::models::settings::TerminalSettings;

use super::error::SshError;
use super::event::{EngineEvent, EventSink, OutputStream};
use super::transport::Transport;

/// 内存管道容量
const PIPE_CAPACITY: usize = 64 * 1024;

/// 终端模式：回显、信号处理、非规范模式、输出处理、CR/NL 转换
const TERMINAL_MODES: &[(Pty, u32)] = &[
    (Pty::ECHO, 1),
    (Pty::TTY_OP_ISPEED, 14400),
    (Pty::TTY_OP_OSPEED, 14400),
    (Pty::ICRNL, 1),
    (Pty::OPOST, 1),
    (Pty::ONLCR, 1),
    (Pty::ICANON, 0),
    (Pty::ISIG, 1),
    (Pty::IEXTEN, 1),
    (Pty::ECHOE, 1),
    (Pty::ECHOK, 1),
    (Pty::ECHONL, 0),
];

/// 发给工作任务的控制消息
#[derive(Debug)]
enum Control {
    Input(Vec<u8>),
    Resize { cols: u32, rows: u32 },
    Close,
}

/// 已注册的终端句柄
struct TerminalHandle {
    control: mpsc::UnboundedSender<Control>,
    generation: u64,
}

type Registry = Arc<RwLock<HashMap<String, TerminalHandle>>>;

/// 终端管理器
pub struct TerminalManager {
    terminals: Registry,
    next_generation: AtomicU64,
    sink: Arc<dyn EventSink>,
    settings: TerminalSettings,
}

impl TerminalManager {
    pub fn new(sink: Arc<dyn EventSink>, settings: TerminalSettings) -> Self {
        Self {
            terminals: Arc::new(RwLock::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
            sink,
            settings,
        }
    }

    /// 打开终端；已有终端时先关闭
    pub async fn open(&self, id: &str, transport: &Transport) -> Result<(), SshError> {
        if self.close(id).await.is_ok() {
            info!("[Terminal] Replaced existing terminal for {}", id);
        }

        let (channel, pending) = self.start_shell(id, transport).await?;

        let (out_writer, out_reader) = tokio::io::duplex(PIPE_CAPACITY);
        let (err_writer, err_reader) = tokio::io::duplex(PIPE_CAPACITY);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // shell 启动成功后才注册
        {
            let mut terminals = self.terminals.write().await;
            terminals.insert(
                id.to_string(),
                TerminalHandle {
                    control: control_tx,
                    generation,
                },
            );
        }

        self.sink.emit(EngineEvent::TerminalStatus {
            config_id: id.to_string(),
            connected: true,
        });

        let worker = tokio::spawn(run_worker(
            id.to_string(),
            channel,
            pending,
            control_rx,
            out_writer,
            err_writer,
        ));
        let out_pump = tokio::spawn(pump_output(
            id.to_string(),
            out_reader,
            OutputStream::Stdout,
            self.settings.read_buffer,
            self.sink.clone(),
        ));
        let err_pump = tokio::spawn(pump_output(
            id.to_string(),
            err_reader,
            OutputStream::Stderr,
            self.settings.read_buffer,
            self.sink.clone(),
        ));

        let terminals = self.terminals.clone();
        let sink = self.sink.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            let (worker, out_pump, err_pump) = tokio::join!(worker, out_pump, err_pump);
            for (task, result) in [("worker", worker), ("stdout", out_pump), ("stderr", err_pump)] {
                if let Err(e) = result {
                    error!("[Terminal] {} task for {} failed: {}", task, id, e);
                }
            }

            sink.emit(EngineEvent::TerminalStatus {
                config_id: id.clone(),
                connected: false,
            });
            deregister(&terminals, &id, generation).await;
            info!("[Terminal] Terminal {} ended", id);
        });

        Ok(())
    }

    /// 打开通道、请求 PTY 和 shell
    ///
    /// 等待应答期间收到的其他消息原样返回，交给工作任务处理。
    async fn start_shell(
        &self,
        id: &str,
        transport: &Transport,
    ) -> Result<(Channel<Msg>, Vec<ChannelMsg>), SshError> {
        let mut channel = transport.open_channel().await?;
        let mut pending = Vec::new();

        for (name, value) in [("TERM", &self.settings.term), ("LANG", &self.settings.lang)] {
            if let Err(e) = channel.set_env(false, name, value.as_str()).await {
                warn!("[Terminal] Failed to set {} for {}: {}", name, id, e);
            }
        }

        let result = async {
            channel
                .request_pty(
                    true,
                    &self.settings.term,
                    self.settings.cols,
                    self.settings.rows,
                    0,
                    0,
                    TERMINAL_MODES,
                )
                .await
                .map_err(|e| SshError::Channel(e.to_string()))?;
            expect_reply(&mut channel, "pty", &mut pending).await?;
            debug!("[Terminal] PTY allocated for {}", id);

            channel
                .request_shell(true)
                .await
                .map_err(|e| SshError::Channel(e.to_string()))?;
            expect_reply(&mut channel, "shell", &mut pending).await
        }
        .await;

        match result {
            Ok(()) => {
                info!("[Terminal] Shell started for {}", id);
                Ok((channel, pending))
            }
            Err(e) => {
                warn!("[Terminal] Failed to start shell for {}: {}", id, e);
                let _ = channel.close().await;
                Err(e)
            }
        }
    }

    async fn control(&self, id: &str, message: Control) -> Result<(), SshError> {
        let terminals = self.terminals.read().await;
        let handle = terminals
            .get(id)
            .ok_or_else(|| SshError::TerminalNotFound(id.to_string()))?;
        handle
            .control
            .send(message)
            .map_err(|_| SshError::Channel(format!("terminal {} is shutting down", id)))
    }

    /// 发送输入
    pub async fn send(&self, id: &str, data: &[u8]) -> Result<(), SshError> {
        // 只记录长度，输入可能包含密码
        debug!("[Terminal] Input for {} [{} bytes]", id, data.len());
        self.control(id, Control::Input(data.to_vec())).await
    }

    /// 调整窗口大小
    pub async fn resize(&self, id: &str, cols: u32, rows: u32) -> Result<(), SshError> {
        debug!("[Terminal] Resize {} to {}x{}", id, cols, rows);
        self.control(id, Control::Resize { cols, rows }).await
    }

    /// 关闭终端并注销
    pub async fn close(&self, id: &str) -> Result<(), SshError> {
        let handle = self
            .terminals
            .write()
            .await
            .remove(id)
            .ok_or_else(|| SshError::TerminalNotFound(id.to_string()))?;

        info!("[Terminal] Closing terminal {}", id);
        if handle.control.send(Control::Close).is_err() {
            debug!("[Terminal] Worker for {} already stopped", id);
        }
        Ok(())
    }

    /// 关闭全部终端
    pub async fn close_all(&self) {
        let handles: Vec<(String, TerminalHandle)> =
            self.terminals.write().await.drain().collect();
        for (id, handle) in handles {
            info!("[Terminal] Closing terminal {}", id);
            let _ = handle.control.send(Control::Close);
        }
    }

    pub async fn exists(&self, id: &str) -> bool {
        self.terminals.read().await.contains_key(id)
    }
}

/// 仅当注册表中仍是同一代终端时注销
async fn deregister(terminals: &Registry, id: &str, generation: u64) {
    let mut terminals = terminals.write().await;
    if terminals
        .get(id)
        .is_some_and(|handle| handle.generation == generation)
    {
        terminals.remove(id);
        debug!("[Terminal] Terminal {} deregistered", id);
    }
}

/// 等待 want_reply 请求的应答
async fn expect_reply(
    channel: &mut Channel<Msg>,
    what: &str,
    pending: &mut Vec<ChannelMsg>,
) -> Result<(), SshError> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => {
                return Err(SshError::Channel(format!("{} request rejected", what)))
            }
            Some(ChannelMsg::Close) | None => {
                return Err(SshError::Channel(format!(
                    "channel closed during {} request",
                    what
                )))
            }
            Some(other) => pending.push(other),
        }
    }
}

/// 工作任务：独占通道，直到远端关闭或收到关闭指令
async fn run_worker(
    id: String,
    mut channel: Channel<Msg>,
    pending: Vec<ChannelMsg>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
    mut stdout: DuplexStream,
    mut stderr: DuplexStream,
) {
    for msg in pending {
        if !forward(&id, msg, &mut stdout, &mut stderr).await {
            return;
        }
    }

    loop {
        tokio::select! {
            control = control_rx.recv() => match control {
                Some(Control::Input(data)) => {
                    if let Err(e) = channel.data(&data[..]).await {
                        warn!("[Terminal] Write to {} failed: {}", id, e);
                        break;
                    }
                }
                Some(Control::Resize { cols, rows }) => {
                    if let Err(e) = channel.window_change(cols, rows, 0, 0).await {
                        warn!("[Terminal] Resize of {} failed: {}", id, e);
                    }
                }
                Some(Control::Close) | None => {
                    let _ = channel.eof().await;
                    let _ = channel.close().await;
                    break;
                }
            },
            msg = channel.wait() => match msg {
                Some(msg) => {
                    if !forward(&id, msg, &mut stdout, &mut stderr).await {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    // 写端在此释放，读取任务随之读到 EOF
    debug!("[Terminal] Worker for {} stopped", id);
}

/// 处理一条通道消息；返回 false 表示通道已结束
async fn forward(
    id: &str,
    msg: ChannelMsg,
    stdout: &mut DuplexStream,
    stderr: &mut DuplexStream,
) -> bool {
    let write = match msg {
        ChannelMsg::Data { data } => stdout.write_all(&data).await,
        ChannelMsg::ExtendedData { data, .. } => stderr.write_all(&data).await,
        ChannelMsg::ExitStatus { exit_status } => {
            info!("[Terminal] Shell for {} exited with {}", id, exit_status);
            Ok(())
        }
        ChannelMsg::Close => return false,
        _ => Ok(()),
    };
    if let Err(e) = write {
        warn!("[Terminal] Output pipe for {} closed: {}", id, e);
        return false;
    }
    true
}

/// 读取任务：每次非空读取发出一个 terminal-output 事件，直到 EOF
async fn pump_output<R>(
    id: String,
    mut reader: R,
    stream: OutputStream,
    buffer_size: usize,
    sink: Arc<dyn EventSink>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut carry = Vec::new();

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let output = decode_chunk(&mut carry, &buf[..n]);
                if !output.is_empty() {
                    sink.emit(EngineEvent::TerminalOutput {
                        config_id: id.clone(),
                        output,
                        stream,
                    });
                }
            }
            Err(e) => {
                warn!("[Terminal] Failed to read {} for {}: {}", stream.as_str(), id, e);
                break;
            }
        }
    }

    if !carry.is_empty() {
        sink.emit(EngineEvent::TerminalOutput {
            config_id: id.clone(),
            output: String::from_utf8_lossy(&carry).into_owned(),
            stream,
        });
    }
    debug!("[Terminal] {} reader for {} stopped", stream.as_str(), id);
}

/// 解码一块输出；非法字节替换为 U+FFFD，末尾不完整的 UTF-8 序列留到下一块
fn decode_chunk(carry: &mut Vec<u8>, data: &[u8]) -> String {
    carry.extend_from_slice(data);

    let mut text = String::with_capacity(carry.len());
    let mut rest = &carry[..];
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                rest = &[];
                break;
            }
            Err(e) => {
                let (valid, tail) = rest.split_at(e.valid_up_to());
                text.push_str(&String::from_utf8_lossy(valid));
                match e.error_len() {
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        rest = &tail[len..];
                    }
                    None => {
                        rest = tail;
                        break;
                    }
                }
            }
        }
    }

    let pending = rest.to_vec();
    *carry = pending;
    text
}
