//! Larder 离线缓存代理
//! 导出公共 API 和类型，供二进制和集成测试使用

pub mod cache;
pub mod cli;
pub mod config;
pub mod consts;
pub mod error;
pub mod http;
pub mod middlewares;
pub mod utils;
pub mod worker;

#[cfg(test)]
mod testing;
