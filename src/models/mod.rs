// 数据模型模块

pub mod file;
pub mod profile;
pub mod session;
pub mod settings;
pub mod shell;

pub use file::{BatchItem, ConnectionStatus, FileEntry, TransferProgress};
pub use profile::{Credential, TargetProfile, TransferMode};
pub use session::SessionInfo;
pub use settings::EngineSettings;
pub use shell::{
    CommandResult, ConnectionInfo, ConnectionResult, FileListResult, RemoteFile, RemoteFileKind,
};
