use std::fs;

use http::Uri;
use serde::Deserialize;

use crate::{
    consts::{
        api_prefix, disk_storage_path, dynamic_prefix, log_folder, log_level, max_body_size,
        offline_message, static_prefix, timeout_default,
    },
    error::{Error, Result},
};

/// 监听配置
#[derive(Deserialize, Clone, Debug)]
pub struct SettingHost {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub ssl: bool,
    /// SSL certificate location
    pub certificate: Option<String>,
    /// ssl key location
    pub certificate_key: Option<String>,
    /// 单个请求的处理超时，单位秒
    #[serde(default = "timeout_default")]
    pub timeout: u16,
}

/// 缓存策略配置
#[derive(Deserialize, Clone, Debug)]
pub struct CacheSettings {
    /// 版本号，写入每个分区名称
    pub version: String,
    #[serde(default = "static_prefix")]
    pub static_prefix: String,
    #[serde(default = "dynamic_prefix")]
    pub dynamic_prefix: String,
    /// 安装阶段必须写入 static 分区的资源
    #[serde(default)]
    pub manifest: Vec<String>,
    /// 目标主机包含该子串的请求不拦截
    pub cms_host: Option<String>,
    #[serde(default = "api_prefix")]
    pub api_prefix: String,
    #[serde(default = "offline_message")]
    pub offline_message: String,
}

impl CacheSettings {
    pub fn static_cache_name(&self) -> String {
        format!("{}-{}", self.static_prefix, self.version)
    }

    pub fn dynamic_cache_name(&self) -> String {
        format!("{}-{}", self.dynamic_prefix, self.version)
    }
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Memory,
    Disk,
}

#[derive(Deserialize, Clone, Debug)]
pub struct StorageSettings {
    #[serde(default)]
    pub kind: StorageKind,
    /// 磁盘存储根目录
    #[serde(default = "disk_storage_path")]
    pub path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            kind: StorageKind::default(),
            path: disk_storage_path(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    #[serde(default = "log_level")]
    pub log_level: String,
    #[serde(default = "log_folder")]
    pub log_folder: String,
    /// 源站地址，相对路径的请求都转发到这里
    pub origin: String,
    /// 出站请求超时，单位秒，不设置时使用客户端默认行为
    pub fetch_timeout: Option<u64>,
    #[serde(default = "max_body_size")]
    pub max_body_size: usize,
    pub cache: CacheSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    pub host: Vec<SettingHost>,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self> {
        let file = fs::read_to_string(path)?;
        Self::from_toml(&file)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn origin_uri(&self) -> Result<Uri> {
        let uri = Uri::try_from(self.origin.as_str())?;
        match uri.scheme_str() {
            Some("http") | Some("https") if uri.authority().is_some() => Ok(uri),
            _ => Err(Error::Config(format!(
                "origin must be an absolute http(s) url: {}",
                self.origin
            ))),
        }
    }

    /// 启动时读取一次、热重载不会生效的字段
    pub fn restart_required(&self, other: &Settings) -> Vec<&'static str> {
        let mut fields = vec![];
        if self.log_level != other.log_level {
            fields.push("log_level");
        }
        if self.log_folder != other.log_folder {
            fields.push("log_folder");
        }
        if self.origin != other.origin {
            fields.push("origin");
        }
        if self.fetch_timeout != other.fetch_timeout {
            fields.push("fetch_timeout");
        }
        if self.max_body_size != other.max_body_size {
            fields.push("max_body_size");
        }
        if self.storage.kind != other.storage.kind || self.storage.path != other.storage.path {
            fields.push("storage");
        }
        fields
    }

    /// 合法但可能不符合预期的配置
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = vec![];
        if self.cache.cms_host.is_none() {
            warnings.push("cache.cms_host is not set, CMS requests will be cached".to_string());
        }
        if self.cache.manifest.is_empty() {
            warnings.push(
                "cache.manifest is empty, nothing is available offline until visited".to_string(),
            );
        }
        warnings
    }

    fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("at least one [[host]] is required".into()));
        }
        self.origin_uri()?;

        let cache = &self.cache;
        if cache.version.trim().is_empty() {
            return Err(Error::Config("cache.version must not be empty".into()));
        }
        for prefix in [&cache.static_prefix, &cache.dynamic_prefix] {
            if prefix.is_empty() || prefix.contains(['/', '\\']) || prefix.starts_with('.') {
                return Err(Error::Config(format!("invalid cache prefix: {prefix:?}")));
            }
        }
        if cache.static_prefix == cache.dynamic_prefix {
            return Err(Error::Config(
                "cache.static_prefix and cache.dynamic_prefix must differ".into(),
            ));
        }
        if cache.version.contains(['/', '\\']) {
            return Err(Error::Config(format!(
                "invalid cache version: {:?}",
                cache.version
            )));
        }
        if let Some(url) = cache.manifest.iter().find(|url| !url.starts_with('/')) {
            return Err(Error::Config(format!(
                "manifest entries must be absolute paths: {url}"
            )));
        }
        if !cache.api_prefix.starts_with('/') {
            return Err(Error::Config(format!(
                "cache.api_prefix must start with '/': {}",
                cache.api_prefix
            )));
        }
        if cache.cms_host.as_ref().is_some_and(|h| h.trim().is_empty()) {
            return Err(Error::Config("cache.cms_host must not be empty".into()));
        }

        for host in &self.host {
            if host.ssl && (host.certificate.is_none() || host.certificate_key.is_none()) {
                return Err(Error::Config(format!(
                    "ssl enabled on {}:{} but certificate or key missing",
                    host.ip, host.port
                )));
            }
        }
        Ok(())
    }
}
