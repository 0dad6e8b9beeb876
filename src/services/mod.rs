// 服务模块

pub mod storage;
pub mod transfer;
pub mod vault;
