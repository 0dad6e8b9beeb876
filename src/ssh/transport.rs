// SSH 传输层封装
// 一个已认证的 russh 连接，负责执行命令、打开通道和断开

use async_trait::async_trait;
use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use tracing::{debug, warn};

use super::error::SshError;
use super::handler::SshClientHandler;
use super::shell::sudo_command;

/// 命令输出
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// 标准输出
    pub stdout: Vec<u8>,
    /// 标准错误
    pub stderr: Vec<u8>,
    /// 按到达顺序合并的输出
    pub combined: Vec<u8>,
    /// 退出码（服务器未上报时为 0）
    pub exit_code: u32,
}

impl CommandOutput {
    /// 获取标准输出字符串
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// 获取合并输出字符串
    pub fn combined_string(&self) -> String {
        String::from_utf8_lossy(&self.combined).to_string()
    }

    /// 检查命令是否成功
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// 非零退出码转换为 Transfer 错误，错误文本包含合并输出
    pub fn into_result(self) -> Result<String, SshError> {
        let text = self.combined_string();
        if self.is_success() {
            Ok(text)
        } else {
            Err(SshError::Transfer(format!(
                "remote command exited with status {}: {}",
                self.exit_code,
                text.trim_end()
            )))
        }
    }
}

/// 远程命令执行接口
///
/// 提权和 SCP 回退逻辑只依赖这个接口。
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// 执行单条命令，返回完整输出
    async fn exec(&self, command: &str) -> Result<CommandOutput, SshError>;

    /// 执行命令，非零退出视为失败
    async fn run(&self, command: &str) -> Result<String, SshError> {
        self.exec(command).await?.into_result()
    }

    /// 通过 sudo 执行命令；密码为空时使用 sudo -n
    async fn run_sudo(&self, password: &str, command: &str) -> Result<String, SshError> {
        self.run(&sudo_command(password, command)).await
    }
}

/// 已认证的 SSH 传输
pub struct Transport {
    handle: Handle<SshClientHandler>,
    /// user@host:port，用于日志
    label: String,
}

impl Transport {
    pub fn new(handle: Handle<SshClientHandler>, label: String) -> Self {
        Self { handle, label }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// 底层连接是否已关闭
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// 打开会话通道
    pub async fn open_channel(&self) -> Result<Channel<Msg>, SshError> {
        self.handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::Channel(format!("failed to open channel: {}", e)))
    }

    /// 打开 SFTP 子系统
    pub async fn open_sftp(&self) -> Result<SftpSession, SshError> {
        let channel = self.open_channel().await?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| SshError::Channel(format!("failed to request sftp subsystem: {}", e)))?;

        let sftp = SftpSession::new(channel.into_stream()).await?;
        debug!("[SSH] {} sftp subsystem ready", self.label);
        Ok(sftp)
    }

    /// 断开连接
    pub async fn close(&self) -> Result<(), SshError> {
        if self.handle.is_closed() {
            return Ok(());
        }
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(SshError::from)
    }
}

#[async_trait]
impl RemoteShell for Transport {
    async fn exec(&self, command: &str) -> Result<CommandOutput, SshError> {
        let mut channel = self.open_channel().await?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;

        let mut collector = OutputCollector::default();
        while let Some(msg) = channel.wait().await {
            if !collector.push(msg, &self.label) {
                break;
            }
        }
        collector.finish()
    }
}

/// 汇总 exec 通道消息
#[derive(Default)]
struct OutputCollector {
    output: CommandOutput,
    exit_code: Option<u32>,
    closed: bool,
}

impl OutputCollector {
    /// 处理一条消息；返回 false 表示通道已关闭
    ///
    /// exit-status 可能在 EOF 之后才到达，读到通道关闭为止。
    fn push(&mut self, msg: ChannelMsg, label: &str) -> bool {
        match msg {
            ChannelMsg::Data { data } => {
                self.output.stdout.extend_from_slice(&data);
                self.output.combined.extend_from_slice(&data);
            }
            ChannelMsg::ExtendedData { data, ext } => {
                if ext == 1 {
                    self.output.stderr.extend_from_slice(&data);
                }
                self.output.combined.extend_from_slice(&data);
            }
            ChannelMsg::ExitStatus { exit_status } => {
                self.exit_code = Some(exit_status);
            }
            ChannelMsg::ExitSignal { signal_name, .. } => {
                warn!("[SSH] {} command killed by signal {:?}", label, signal_name);
                self.exit_code.get_or_insert(255);
            }
            ChannelMsg::Close => {
                self.closed = true;
                return false;
            }
            _ => {}
        }
        true
    }

    /// 通道正常关闭但没有 exit-status 时按成功处理；
    /// 连接中途断开（既无关闭也无退出码）视为失败
    fn finish(mut self) -> Result<CommandOutput, SshError> {
        match self.exit_code {
            Some(code) => {
                self.output.exit_code = code;
                Ok(self.output)
            }
            None if self.closed => Ok(self.output),
            None => Err(SshError::Channel(
                "connection lost before command finished".to_string(),
            )),
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        debug!("[SSH] Dropping transport {}", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_zero_exit_folds_output_into_error() {
        let output = CommandOutput {
            combined: b"mv: cannot stat '/tmp/a'\n".to_vec(),
            exit_code: 1,
            ..Default::default()
        };
        let err = output.into_result().unwrap_err();
        let text = err.to_string();
        assert!(matches!(err, SshError::Transfer(_)));
        assert!(text.contains("status 1"));
        assert!(text.contains("cannot stat"));
    }

    #[test]
    fn test_success_returns_combined_text() {
        let output = CommandOutput {
            stdout: b"/home/ops\n".to_vec(),
            combined: b"/home/ops\n".to_vec(),
            ..Default::default()
        };
        assert_eq!(output.stdout_string(), "/home/ops\n");
        assert_eq!(output.into_result().unwrap(), "/home/ops\n");
    }

    fn data(bytes: &[u8]) -> ChannelMsg {
        ChannelMsg::Data {
            data: russh::CryptoVec::from_slice(bytes),
        }
    }

    #[test]
    fn test_exit_status_after_eof_is_kept() {
        let mut collector = OutputCollector::default();
        assert!(collector.push(data(b"out"), "t"));
        assert!(collector.push(ChannelMsg::Eof, "t"));
        assert!(collector.push(ChannelMsg::ExitStatus { exit_status: 2 }, "t"));
        assert!(!collector.push(ChannelMsg::Close, "t"));

        let output = collector.finish().unwrap();
        assert_eq!(output.exit_code, 2);
        assert_eq!(output.stdout_string(), "out");
    }

    #[test]
    fn test_dropped_connection_is_not_success() {
        let mut collector = OutputCollector::default();
        collector.push(data(b"partial"), "t");
        assert!(matches!(collector.finish(), Err(SshError::Channel(_))));
    }

    #[test]
    fn test_close_without_status_is_success() {
        let mut collector = OutputCollector::default();
        collector.push(ChannelMsg::Close, "t");
        assert_eq!(collector.finish().unwrap().exit_code, 0);
    }
}
