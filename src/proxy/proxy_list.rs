// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::CrawlError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// 代理协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    #[default]
    Http,
    Https,
    Socks5,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
            ProxyScheme::Socks5 => "socks5",
        }
    }
}

impl FromStr for ProxyScheme {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyScheme::Http),
            "https" => Ok(ProxyScheme::Https),
            "socks5" => Ok(ProxyScheme::Socks5),
            other => Err(CrawlError::ProxyList(format!(
                "unsupported proxy scheme: {}",
                other
            ))),
        }
    }
}

/// 代理服务器
///
/// 创建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub scheme: ProxyScheme,
}

impl Proxy {
    pub fn new(host: impl Into<String>, port: u16, scheme: ProxyScheme) -> Self {
        Self {
            host: host.into(),
            port,
            user: None,
            password: None,
            scheme,
        }
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 不带认证信息的代理URL
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }

    /// 认证信息
    pub fn auth(&self) -> Option<(&str, &str)> {
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            (Some(user), None) => Some((user.as_str(), "")),
            _ => None,
        }
    }

    /// 解析一行代理配置
    ///
    /// 支持 `host:port` 与 `host:port:user:password` 两种格式
    pub fn parse_line(line: &str, scheme: ProxyScheme) -> Result<Self, CrawlError> {
        let parts: Vec<&str> = line.trim().split(':').collect();
        let (host, port, user, password) = match parts.as_slice() {
            [host, port] => (*host, *port, None, None),
            [host, port, user, password] => (
                *host,
                *port,
                Some(user.to_string()),
                Some(password.to_string()),
            ),
            _ => {
                return Err(CrawlError::ProxyList(format!(
                    "invalid proxy line: {}",
                    line
                )))
            }
        };
        if host.is_empty() {
            return Err(CrawlError::ProxyList(format!("empty proxy host: {}", line)));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| CrawlError::ProxyList(format!("invalid proxy port: {}", line)))?;

        Ok(Self {
            host: host.to_string(),
            port,
            user,
            password,
            scheme,
        })
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 不输出密码
        match &self.user {
            Some(user) => write!(
                f,
                "{}://{}@{}:{}",
                self.scheme.as_str(),
                user,
                self.host,
                self.port
            ),
            None => write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port),
        }
    }
}

/// 代理列表来源
#[derive(Debug, Clone)]
pub enum ProxySource {
    /// 本地文件，每行一个代理
    File(PathBuf),
    /// 远程URL，响应体每行一个代理
    Url(String),
    /// 内存中的固定列表
    List(Vec<Proxy>),
}

/// 代理选择方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProxyRotation {
    /// 随机选择
    #[default]
    Random,
    /// 轮询
    RoundRobin,
}

/// 代理列表
///
/// 持有轮换状态，但从不修改代理本身。
/// `next_server` 的游标是原子的，可被所有网络工作器并发调用。
pub struct ProxyList {
    source: ProxySource,
    scheme: ProxyScheme,
    rotation: ProxyRotation,
    servers: RwLock<Arc<Vec<Proxy>>>,
    cursor: AtomicUsize,
}

impl ProxyList {
    /// 从来源加载代理列表
    ///
    /// # 参数
    ///
    /// * `source` - 代理列表来源
    /// * `scheme` - 文件或URL来源中代理使用的协议
    /// * `rotation` - 代理钩子使用的选择方式
    ///
    /// # 返回值
    ///
    /// * `Ok(ProxyList)` - 加载成功
    /// * `Err(CrawlError)` - 读取失败或列表为空
    pub async fn load(
        source: ProxySource,
        scheme: ProxyScheme,
        rotation: ProxyRotation,
    ) -> Result<Self, CrawlError> {
        let servers = Self::read_source(&source, scheme).await?;
        info!(count = servers.len(), "Proxy list loaded");
        Ok(Self {
            source,
            scheme,
            rotation,
            servers: RwLock::new(Arc::new(servers)),
            cursor: AtomicUsize::new(0),
        })
    }

    /// 使用内存列表创建
    pub fn from_list(servers: Vec<Proxy>, rotation: ProxyRotation) -> Result<Self, CrawlError> {
        if servers.is_empty() {
            return Err(CrawlError::ProxyList("proxy list is empty".to_string()));
        }
        let scheme = servers[0].scheme;
        Ok(Self {
            source: ProxySource::List(servers.clone()),
            scheme,
            rotation,
            servers: RwLock::new(Arc::new(servers)),
            cursor: AtomicUsize::new(0),
        })
    }

    /// 从同一来源重新加载；内存列表不做任何事
    pub async fn reload(&self) -> Result<(), CrawlError> {
        if let ProxySource::List(_) = self.source {
            return Ok(());
        }
        let servers = Self::read_source(&self.source, self.scheme).await?;
        info!(count = servers.len(), "Proxy list reloaded");
        *self.servers.write() = Arc::new(servers);
        Ok(())
    }

    /// 随机选择一个代理
    pub fn random_server(&self) -> Proxy {
        let servers = self.servers.read().clone();
        let idx = rand::random_range(0..servers.len());
        servers[idx].clone()
    }

    /// 轮询选择下一个代理
    pub fn next_server(&self) -> Proxy {
        let servers = self.servers.read().clone();
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % servers.len();
        servers[idx].clone()
    }

    /// 按配置的选择方式返回代理
    pub fn select(&self) -> Proxy {
        match self.rotation {
            ProxyRotation::Random => self.random_server(),
            ProxyRotation::RoundRobin => self.next_server(),
        }
    }

    pub fn size(&self) -> usize {
        self.servers.read().len()
    }

    pub fn rotation(&self) -> ProxyRotation {
        self.rotation
    }

    async fn read_source(
        source: &ProxySource,
        scheme: ProxyScheme,
    ) -> Result<Vec<Proxy>, CrawlError> {
        let servers = match source {
            ProxySource::List(servers) => servers.clone(),
            ProxySource::File(path) => {
                let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                    CrawlError::ProxyList(format!("failed to read {}: {}", path.display(), e))
                })?;
                Self::parse_content(&content, scheme)?
            }
            ProxySource::Url(url) => {
                let content = reqwest::get(url)
                    .await
                    .and_then(|res| res.error_for_status())
                    .map_err(|e| CrawlError::ProxyList(format!("failed to fetch {}: {}", url, e)))?
                    .text()
                    .await
                    .map_err(|e| CrawlError::ProxyList(format!("failed to read {}: {}", url, e)))?;
                Self::parse_content(&content, scheme)?
            }
        };

        if servers.is_empty() {
            return Err(CrawlError::ProxyList("proxy list is empty".to_string()));
        }
        Ok(servers)
    }

    fn parse_content(content: &str, scheme: ProxyScheme) -> Result<Vec<Proxy>, CrawlError> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| Proxy::parse_line(line, scheme))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Write;

    fn sample() -> Vec<Proxy> {
        vec![
            Proxy::new("10.0.0.1", 8080, ProxyScheme::Http),
            Proxy::new("10.0.0.2", 8080, ProxyScheme::Http),
            Proxy::new("10.0.0.3", 8080, ProxyScheme::Http),
        ]
    }

    #[test]
    fn test_parse_line_formats() {
        let proxy = Proxy::parse_line("1.2.3.4:3128", ProxyScheme::Http).unwrap();
        assert_eq!(proxy.address(), "1.2.3.4:3128");
        assert!(proxy.auth().is_none());

        let proxy = Proxy::parse_line("1.2.3.4:1080:bob:secret", ProxyScheme::Socks5).unwrap();
        assert_eq!(proxy.auth(), Some(("bob", "secret")));
        assert_eq!(proxy.url(), "socks5://1.2.3.4:1080");
        assert_eq!(proxy.to_string(), "socks5://bob@1.2.3.4:1080");

        assert!(Proxy::parse_line("1.2.3.4", ProxyScheme::Http).is_err());
        assert!(Proxy::parse_line("1.2.3.4:http", ProxyScheme::Http).is_err());
    }

    #[test]
    fn test_next_server_cycles() {
        let list = ProxyList::from_list(sample(), ProxyRotation::RoundRobin).unwrap();
        let picked: Vec<String> = (0..6).map(|_| list.next_server().host).collect();
        assert_eq!(
            picked,
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.1", "10.0.0.2", "10.0.0.3"]
        );
    }

    #[test]
    fn test_random_server_picks_from_list() {
        let list = ProxyList::from_list(sample(), ProxyRotation::Random).unwrap();
        let hosts: HashSet<String> = sample().into_iter().map(|p| p.host).collect();
        for _ in 0..20 {
            assert!(hosts.contains(&list.random_server().host));
        }
    }

    #[test]
    fn test_empty_list_is_rejected() {
        assert!(ProxyList::from_list(Vec::new(), ProxyRotation::Random).is_err());
    }

    #[tokio::test]
    async fn test_next_server_concurrent_callers() {
        let list = Arc::new(ProxyList::from_list(sample(), ProxyRotation::RoundRobin).unwrap());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let list = list.clone();
            handles.push(tokio::spawn(async move {
                (0..30).map(|_| list.next_server().host).collect::<Vec<_>>()
            }));
        }
        let mut counts = std::collections::HashMap::new();
        for handle in handles {
            for host in handle.await.unwrap() {
                *counts.entry(host).or_insert(0) += 1;
            }
        }
        // 120 次调用平均分配到 3 个代理
        assert!(counts.values().all(|&c| c == 40));
    }

    #[tokio::test]
    async fn test_load_and_reload_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# upstream proxies").unwrap();
        writeln!(file, "10.0.0.1:8080").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "10.0.0.2:8080:user:pass").unwrap();
        file.flush().unwrap();

        let list = ProxyList::load(
            ProxySource::File(file.path().to_path_buf()),
            ProxyScheme::Http,
            ProxyRotation::RoundRobin,
        )
        .await
        .unwrap();
        assert_eq!(list.size(), 2);

        writeln!(file, "10.0.0.3:8080").unwrap();
        file.flush().unwrap();
        list.reload().await.unwrap();
        assert_eq!(list.size(), 3);
    }
}
