use std::env;

pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const OS: &str = env::consts::OS;
pub const ARCH: &str = env::consts::ARCH;
pub const COMPILER: &str = env!("LARDER_COMPILER");
pub const COMMIT: &str = env!("LARDER_COMMIT");

// config defaults
pub const LOG_LEVEL: &str = "info";
pub fn log_level() -> String {
    LOG_LEVEL.to_string()
}

pub const LOG_FOLDER: &str = "./logs";
pub fn log_folder() -> String {
    LOG_FOLDER.to_string()
}

pub const TIMEOUT_DEFAULT: u16 = 75;
pub fn timeout_default() -> u16 {
    TIMEOUT_DEFAULT
}

/// 请求体和上游响应体的缓冲上限
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;
pub fn max_body_size() -> usize {
    MAX_BODY_SIZE
}

pub const STATIC_PREFIX: &str = "static";
pub fn static_prefix() -> String {
    STATIC_PREFIX.to_string()
}

pub const DYNAMIC_PREFIX: &str = "dynamic";
pub fn dynamic_prefix() -> String {
    DYNAMIC_PREFIX.to_string()
}

pub const API_PREFIX: &str = "/api/";
pub fn api_prefix() -> String {
    API_PREFIX.to_string()
}

pub const OFFLINE_MESSAGE: &str = "You are offline. Please check your connection.";
pub fn offline_message() -> String {
    OFFLINE_MESSAGE.to_string()
}

pub const DISK_STORAGE_PATH: &str = "./larder-cache";
pub fn disk_storage_path() -> String {
    DISK_STORAGE_PATH.to_string()
}

/// 离线兜底页面使用的根文档
pub const ROOT_DOCUMENT: &str = "/";

/// 标记响应来源的头部
pub const X_CACHE: &str = "x-cache";
