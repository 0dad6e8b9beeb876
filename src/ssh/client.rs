// SSH 客户端核心实现
// 根据目标配置建立连接并完成认证，返回 Transport

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{AuthResult, Handle};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::config::{AuthMethod, SshConfig};
use super::error::SshError;
use super::handler::SshClientHandler;
use super::transport::Transport;

/// 已加载的认证材料（连接前准备好，私钥问题不需要走网络就能发现）
enum Credentials {
    Password(String),
    Key(russh::keys::PrivateKey),
}

/// 建立 SSH 连接
///
/// 认证配置问题返回 `AuthConfig`；网络、握手、认证和超时统一包装为 `Connect`。
pub async fn connect(config: &SshConfig) -> Result<Transport, SshError> {
    let credentials = load_credentials(&config.auth).await?;
    let address = config.address();

    info!(
        "[SSH] Connecting to {}@{} (timeout {}s)",
        config.username, address, config.connect_timeout
    );

    let connect_timeout = Duration::from_secs(config.connect_timeout);
    let result = timeout(connect_timeout, establish(config, &address, credentials))
        .await
        .unwrap_or(Err(SshError::Timeout(config.connect_timeout)));

    match result {
        Ok(handle) => {
            info!("[SSH] Connected to {}@{}", config.username, address);
            Ok(Transport::new(
                handle,
                format!("{}@{}", config.username, address),
            ))
        }
        Err(e) => {
            warn!("[SSH] Connection to {} failed: {}", address, e);
            Err(SshError::Connect(e.to_string()))
        }
    }
}

/// TCP 连接 + SSH 握手 + 认证
async fn establish(
    config: &SshConfig,
    address: &str,
    credentials: Credentials,
) -> Result<Handle<SshClientHandler>, SshError> {
    let tcp_stream = TcpStream::connect(address).await?;
    debug!("[SSH] TCP connection established to {}", address);

    let russh_config = Arc::new(config.to_russh_config());
    let handler = SshClientHandler::new(address.to_string());

    let mut handle = russh::client::connect_stream(russh_config, tcp_stream, handler).await?;
    debug!("[SSH] Handshake completed with {}", address);

    authenticate(&mut handle, &config.username, credentials).await?;
    Ok(handle)
}

/// 执行认证
async fn authenticate(
    handle: &mut Handle<SshClientHandler>,
    username: &str,
    credentials: Credentials,
) -> Result<(), SshError> {
    let (method, auth_result) = match credentials {
        Credentials::Password(password) => {
            debug!("[SSH] Using password authentication");
            let result = handle.authenticate_password(username, password).await?;
            ("Password", result)
        }
        Credentials::Key(key) => {
            debug!("[SSH] Using public key authentication");
            let key_with_alg = russh::keys::PrivateKeyWithHashAlg::new(Arc::new(key), None);
            let result = handle.authenticate_publickey(username, key_with_alg).await?;
            ("Public key", result)
        }
    };

    match auth_result {
        AuthResult::Success => Ok(()),
        AuthResult::Failure {
            partial_success: true,
            ..
        } => Err(SshError::Auth(
            "Partial authentication - additional auth required".to_string(),
        )),
        AuthResult::Failure {
            remaining_methods, ..
        } => Err(SshError::Auth(format!(
            "{} authentication failed. Server suggests: {:?}",
            method, remaining_methods
        ))),
    }
}

/// 读取认证材料
async fn load_credentials(auth: &AuthMethod) -> Result<Credentials, SshError> {
    match auth {
        AuthMethod::Password(password) => Ok(Credentials::Password(password.clone())),
        AuthMethod::PublicKey { key_path } => {
            load_private_key(key_path).await.map(Credentials::Key)
        }
    }
}

/// 加载私钥文件
async fn load_private_key(key_path: &Path) -> Result<russh::keys::PrivateKey, SshError> {
    debug!("[SSH] Loading private key from {:?}", key_path);

    let key_data = tokio::fs::read(key_path).await.map_err(|e| {
        SshError::AuthConfig(format!("Failed to read key file {:?}: {}", key_path, e))
    })?;

    russh::keys::decode_secret_key(&String::from_utf8_lossy(&key_data), None)
        .map_err(|e| SshError::AuthConfig(format!("Failed to decode key {:?}: {}", key_path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreadable_key_is_auth_config_error() {
        let auth = AuthMethod::PublicKey {
            key_path: "/nonexistent/shellvault/id_ed25519".into(),
        };
        let err = load_credentials(&auth).await.err().unwrap();
        assert!(matches!(err, SshError::AuthConfig(_)));
    }

    #[tokio::test]
    async fn test_garbage_key_is_auth_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_rsa");
        std::fs::write(&path, "not a key").unwrap();

        let auth = AuthMethod::PublicKey { key_path: path };
        let err = load_credentials(&auth).await.err().unwrap();
        assert!(matches!(err, SshError::AuthConfig(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_is_connect_error() {
        // 先绑定再释放，得到一个大概率无人监听的本地端口
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = SshConfig {
            host: "127.0.0.1".into(),
            port,
            username: "ops".into(),
            auth: AuthMethod::Password("p".into()),
            connect_timeout: 2,
        };
        let err = connect(&config).await.err().unwrap();
        assert!(matches!(err, SshError::Connect(_)));
    }
}
