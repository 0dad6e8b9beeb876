// 加密凭据库
//
// - crypto: 口令派生与字段加解密
// - store: 配置记录的加载、保存与增删改
// - reauth: 免密恢复令牌

pub mod crypto;
pub mod error;
pub mod reauth;
pub mod store;

pub use error::VaultError;
pub use reauth::ReauthToken;
pub use store::{Vault, VaultPaths};
