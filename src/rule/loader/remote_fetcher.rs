//! Remote rule fetcher module
//! 远程规则源拉取工具
//! 核心特性：
//! 1. 纯异步设计（基于tokio异步运行时）
//! 2. 可配置重试策略（Never/Times(n)）
//! 3. GitHub raw 镜像回退：直连失败后本轮运行内改用镜像
//! 4. ETag缓存控制（If-None-Match / 304 复用本地 payload）
//! 5. 全部线路失败时回退到过期缓存

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::{Client, StatusCode, header};
use tracing::{debug, warn};
use url::Url;

use crate::config::{GlobalConfig, RetryPolicy};
use crate::error::{RmResult, RuleMergeError};
use crate::rule::cache::{CachedSource, SourceCacheManager};
use crate::rule::loader::EtagManager;
use crate::rule::loader::etag::{ETagTotalRecord, clean_etag};
use crate::rule::model::SourceFormat;
use crate::rule::parser::RuleParser;
use crate::utils::preview_compact;

/// 原始URL可达状态（全局共享，避免每个源都先撞一次直连超时）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawUrlStatus {
    // 未尝试（初始状态）
    Untried,
    // 可访问（后续优先用原始URL）
    Accessible,
    // 不可访问（后续直接用镜像URL）
    Inaccessible,
}

/// 规则源数据来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrigin {
    /// 直连拉取
    Remote,
    /// 通过镜像拉取
    Mirror,
    /// 远程未变化（304），使用缓存
    NotModified,
    /// 拉取失败，回退到过期缓存
    StaleCache,
}

impl fmt::Display for FetchOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchOrigin::Remote => write!(f, "remote"),
            FetchOrigin::Mirror => write!(f, "mirror"),
            FetchOrigin::NotModified => write!(f, "not-modified"),
            FetchOrigin::StaleCache => write!(f, "stale-cache"),
        }
    }
}

/// 拉取并解析完成的规则源
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub url: String,
    pub format: SourceFormat,
    pub payload: Vec<String>,
    pub origin: FetchOrigin,
}

impl FetchedSource {
    fn from_cache(cached: CachedSource, origin: FetchOrigin) -> Self {
        Self {
            url: cached.url,
            format: cached.format,
            payload: cached.payload,
            origin,
        }
    }
}

/// 单次 HTTP 请求结果
#[derive(Debug)]
enum HttpOutcome {
    Body { text: String, etag: Option<String> },
    NotModified,
}

/// 远程规则拉取器
/// 持有共享 HTTP 客户端与镜像可达状态，按顺序逐个拉取规则源
pub struct RemoteRuleFetcher {
    client: Client,
    retry: RetryPolicy,
    mirror_prefix: Option<String>,
    mirror_hosts: Vec<String>,
    raw_url_status: RawUrlStatus,
    parser: RuleParser,
    etag_manager: EtagManager,
}

impl RemoteRuleFetcher {
    pub fn new(config: &GlobalConfig) -> RmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout))
            .user_agent(config.user_agent.clone())
            .gzip(true)
            .build()?;

        let mirror_prefix = config
            .gh_proxy_url
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                if p.ends_with('/') {
                    p.to_string()
                } else {
                    format!("{}/", p)
                }
            });

        Ok(Self {
            client,
            retry: config.retry,
            mirror_prefix,
            mirror_hosts: config.mirror_hosts.clone(),
            raw_url_status: RawUrlStatus::Untried,
            parser: RuleParser,
            etag_manager: EtagManager::default(),
        })
    }

    pub fn raw_url_status(&self) -> RawUrlStatus {
        self.raw_url_status
    }

    /// 构建镜像URL：<prefix><去掉协议头的原始URL>，仅 mirror_hosts 中的域名可用
    pub fn mirror_url(&self, url: &str) -> Option<String> {
        let prefix = self.mirror_prefix.as_ref()?;
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        if !self.mirror_hosts.iter().any(|h| h.eq_ignore_ascii_case(host)) {
            return None;
        }
        let path = url
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        Some(format!("{}{}", prefix, path))
    }

    /// 通用异步重试逻辑
    /// 保留最后一次错误信息，两次尝试间隔1秒；4xx 不重试
    async fn simple_retry<F, Fut, T>(&self, max_retries: usize, mut func: F) -> RmResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = RmResult<T>> + Send + 'static,
    {
        let mut last_err: Option<RuleMergeError> = None;

        for attempt in 0..=max_retries {
            match func().await {
                Ok(res) => return Ok(res),
                Err(e) if !is_retryable(&e) => return Err(e),
                Err(e) => {
                    if attempt < max_retries {
                        warn!(
                            "Request failed: {}, retrying (attempt {}/{})",
                            e,
                            attempt + 1,
                            max_retries
                        );
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            RuleMergeError::RuleLoadError("All retry attempts exhausted".to_string())
        }))
    }

    /// 按重试策略请求单个URL
    async fn request_with_retry(&self, url: &str, etag: Option<&str>) -> RmResult<HttpOutcome> {
        let max_retries = self.retry.max_retries();
        self.simple_retry(max_retries, || {
            // 捕获上下文变量（clone避免生命周期问题）
            send_request(self.client.clone(), url.to_string(), etag.map(str::to_string))
        })
        .await
    }

    /// 根据镜像可达状态选择线路
    async fn request_with_routes(
        &mut self,
        url: &str,
        etag: Option<&str>,
    ) -> RmResult<(HttpOutcome, FetchOrigin)> {
        let Some(mirror) = self.mirror_url(url) else {
            let outcome = self.request_with_retry(url, etag).await?;
            return Ok((outcome, FetchOrigin::Remote));
        };

        if self.raw_url_status != RawUrlStatus::Inaccessible {
            match self.request_with_retry(url, etag).await {
                Ok(outcome) => {
                    self.raw_url_status = RawUrlStatus::Accessible;
                    return Ok((outcome, FetchOrigin::Remote));
                }
                Err(e) if is_route_error(&e) => {
                    warn!("原始URL拉取失败：{}，切换为镜像URL：{}", e, mirror);
                    self.raw_url_status = RawUrlStatus::Inaccessible;
                }
                Err(e) => {
                    // 线路可达，仅该规则源失败
                    self.raw_url_status = RawUrlStatus::Accessible;
                    return Err(e);
                }
            }
        } else {
            debug!("原始URL不可访问，直接使用镜像URL拉取：{}", mirror);
        }

        let outcome = self.request_with_retry(&mirror, etag).await?;
        Ok((outcome, FetchOrigin::Mirror))
    }

    /// 拉取并解析单个规则源
    /// 返回：payload 行 | 错误（无可用缓存时）
    pub async fn fetch_source(
        &mut self,
        config: &GlobalConfig,
        url: &str,
    ) -> RmResult<FetchedSource> {
        let format = SourceFormat::from_url(url)?;

        let cached = if config.use_cache {
            SourceCacheManager::load_from_cache(config, url).await.ok()
        } else {
            None
        };
        let mut etag_records = if config.use_cache {
            self.etag_manager.load(config).unwrap_or_else(|e| {
                warn!("ETag 记录读取失败：{}", e);
                ETagTotalRecord::default()
            })
        } else {
            ETagTotalRecord::default()
        };
        let local_etag = match &cached {
            Some(_) => etag_records.find_record(url).map(|r| r.etag.clone()),
            None => None,
        };

        let result = match self.request_with_routes(url, local_etag.as_deref()).await {
            Ok((HttpOutcome::NotModified, _)) => match cached.clone() {
                Some(c) => {
                    debug!("[{}] 远程未变化（304），使用本地缓存", url);
                    Ok(FetchedSource::from_cache(c, FetchOrigin::NotModified))
                }
                None => Err(RuleMergeError::RuleLoadError(format!(
                    "URL {} 返回 304 但本地无缓存",
                    url
                ))),
            },
            Ok((HttpOutcome::Body { text, etag }, origin)) => {
                match self.parser.parse_payload(&text, format) {
                    Ok(payload) => {
                        if config.use_cache {
                            self.store(config, &mut etag_records, url, format, &payload, etag)
                                .await;
                        }
                        Ok(FetchedSource {
                            url: url.to_string(),
                            format,
                            payload,
                            origin,
                        })
                    }
                    Err(e) => {
                        debug!("无法解析的响应体：{}", preview_compact(&text, 120));
                        Err(e)
                    }
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(source) => {
                debug!(
                    "[{}] 拉取完成（{}），规则行数：{}",
                    url,
                    source.origin,
                    source.payload.len()
                );
                Ok(source)
            }
            Err(e) => match cached {
                Some(c) if config.offline_fallback => {
                    warn!("[{}] 拉取失败：{}，回退到本地缓存（{} 行）", url, e, c.payload.len());
                    Ok(FetchedSource::from_cache(c, FetchOrigin::StaleCache))
                }
                _ => Err(e),
            },
        }
    }

    /// 写入 payload 缓存与 ETag 记录，失败仅记录警告
    /// 响应无 ETag 时移除旧记录，避免下次用过期标签命中 304
    async fn store(
        &self,
        config: &GlobalConfig,
        etag_records: &mut ETagTotalRecord,
        url: &str,
        format: SourceFormat,
        payload: &[String],
        etag: Option<String>,
    ) {
        let fetched_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let cached = CachedSource {
            url: url.to_string(),
            format,
            payload: payload.to_vec(),
            fetched_at,
        };

        let cache_path = match SourceCacheManager::save_to_cache(config, &cached).await {
            Ok(path) => path,
            Err(e) => {
                warn!("规则源缓存到本地失败：{}", e);
                return;
            }
        };

        if let Err(e) = self.etag_manager.record_fetch(
            config,
            etag_records,
            url,
            etag,
            cache_path.display().to_string(),
        ) {
            warn!("ETag 记录保存失败：{}", e);
        }
    }
}

/// 传输层错误（连接失败/超时）才说明线路不可达
fn is_route_error(err: &RuleMergeError) -> bool {
    matches!(err, RuleMergeError::HttpError(e) if e.is_connect() || e.is_timeout())
}

/// 4xx 属于规则源本身的问题，重试无意义
fn is_retryable(err: &RuleMergeError) -> bool {
    !matches!(err, RuleMergeError::HttpStatus { status, .. } if (400..500).contains(status))
}

/// 发送 GET 请求；携带 ETag 时附加 If-None-Match
async fn send_request(client: Client, url: String, etag: Option<String>) -> RmResult<HttpOutcome> {
    let mut request = client.get(&url);
    if let Some(etag) = &etag {
        request = request.header(header::IF_NONE_MATCH, format!("\"{}\"", etag));
    }

    let response = request.send().await?;
    let status = response.status();
    if status == StatusCode::NOT_MODIFIED {
        return Ok(HttpOutcome::NotModified);
    }
    if !status.is_success() {
        return Err(RuleMergeError::HttpStatus {
            url,
            status: status.as_u16(),
        });
    }

    let etag = response
        .headers()
        .get(header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(clean_etag)
        .filter(|e| !e.is_empty());
    let text = response.text().await?;
    Ok(HttpOutcome::Body { text, etag })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigManager;
    use crate::test_support::{ok_response, spawn_origin, status_response};

    fn test_config(cache_dir: &std::path::Path, retry: RetryPolicy) -> GlobalConfig {
        ConfigManager::custom()
            .cache_dir(cache_dir.to_path_buf())
            .http_timeout(5)
            .retry(retry)
            .gh_proxy_url(None)
            .build()
    }

    #[test]
    fn test_mirror_url_only_for_github_hosts() {
        let config = ConfigManager::custom()
            .gh_proxy_url(Some("https://ghfast.top".to_string()))
            .build();
        let fetcher = RemoteRuleFetcher::new(&config).unwrap();

        assert_eq!(
            fetcher
                .mirror_url("https://raw.githubusercontent.com/a/b/main/c.list")
                .as_deref(),
            Some("https://ghfast.top/raw.githubusercontent.com/a/b/main/c.list")
        );
        assert_eq!(fetcher.mirror_url("https://example.com/c.list"), None);

        let no_mirror = ConfigManager::custom().gh_proxy_url(None).build();
        let fetcher = RemoteRuleFetcher::new(&no_mirror).unwrap();
        assert_eq!(
            fetcher.mirror_url("https://raw.githubusercontent.com/a/b/main/c.list"),
            None
        );
    }

    #[tokio::test]
    async fn test_fetch_then_not_modified_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), RetryPolicy::Never);
        let (base, requests) = spawn_origin(vec![
            ok_response("DOMAIN-SUFFIX,openai.com\n# c\nDOMAIN,chat.openai.com\n", Some("v1")),
            status_response(304, "Not Modified"),
        ])
        .await;
        let url = format!("{}/OpenAI.list", base);
        let mut fetcher = RemoteRuleFetcher::new(&config).unwrap();

        let first = fetcher.fetch_source(&config, &url).await.unwrap();
        assert_eq!(first.origin, FetchOrigin::Remote);
        assert_eq!(first.payload.len(), 2);

        let second = fetcher.fetch_source(&config, &url).await.unwrap();
        assert_eq!(second.origin, FetchOrigin::NotModified);
        assert_eq!(second.payload, first.payload);

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].to_ascii_lowercase().contains("if-none-match: \"v1\""));
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_stale_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), RetryPolicy::Never);
        let (base, _) = spawn_origin(vec![
            ok_response("payload:\n  - '+.example.com'\n", None),
            status_response(500, "Internal Server Error"),
            status_response(500, "Internal Server Error"),
        ])
        .await;
        let url = format!("{}/proxy.txt", base);
        let mut fetcher = RemoteRuleFetcher::new(&config).unwrap();

        fetcher.fetch_source(&config, &url).await.unwrap();
        let stale = fetcher.fetch_source(&config, &url).await.unwrap();
        assert_eq!(stale.origin, FetchOrigin::StaleCache);
        assert_eq!(stale.payload, vec!["+.example.com".to_string()]);

        let strict = ConfigManager::custom()
            .cache_dir(dir.path().to_path_buf())
            .retry(RetryPolicy::Never)
            .gh_proxy_url(None)
            .offline_fallback(false)
            .build();
        let err = fetcher.fetch_source(&strict, &url).await.unwrap_err();
        assert!(matches!(err, RuleMergeError::HttpStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), RetryPolicy::Times(1));
        let (base, requests) = spawn_origin(vec![
            status_response(503, "Service Unavailable"),
            ok_response("DOMAIN,a.com\n", None),
        ])
        .await;
        let url = format!("{}/a.list", base);
        let mut fetcher = RemoteRuleFetcher::new(&config).unwrap();

        let fetched = fetcher.fetch_source(&config, &url).await.unwrap();
        assert_eq!(fetched.payload, vec!["DOMAIN,a.com".to_string()]);
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    /// 本地回环上的镜像配置：把 127.0.0.1 视为可走镜像的域名
    fn mirror_config(cache_dir: &std::path::Path, mirror: &str, retry: RetryPolicy) -> GlobalConfig {
        ConfigManager::custom()
            .cache_dir(cache_dir.to_path_buf())
            .http_timeout(5)
            .retry(retry)
            .gh_proxy_url(Some(mirror.to_string()))
            .mirror_hosts(vec!["127.0.0.1".to_string()])
            .build()
    }

    /// 已关闭的端口，连接会被拒绝
    async fn closed_origin() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_connect_failure_switches_to_mirror_for_rest_of_run() {
        let dir = tempfile::tempdir().unwrap();
        let (mirror, mirror_requests) = spawn_origin(vec![
            ok_response("DOMAIN,a.com\n", None),
            ok_response("DOMAIN,b.com\n", None),
        ])
        .await;
        let (live_direct, direct_requests) =
            spawn_origin(vec![ok_response("DOMAIN,direct.com\n", None)]).await;
        let dead_direct = closed_origin().await;
        let config = mirror_config(dir.path(), &mirror, RetryPolicy::Never);
        let mut fetcher = RemoteRuleFetcher::new(&config).unwrap();
        assert_eq!(fetcher.raw_url_status(), RawUrlStatus::Untried);

        let first = fetcher
            .fetch_source(&config, &format!("{}/a.list", dead_direct))
            .await
            .unwrap();
        assert_eq!(first.origin, FetchOrigin::Mirror);
        assert_eq!(first.payload, vec!["DOMAIN,a.com".to_string()]);
        assert_eq!(fetcher.raw_url_status(), RawUrlStatus::Inaccessible);

        // 线路已判定不可达：即使直连可用也不再尝试
        let second = fetcher
            .fetch_source(&config, &format!("{}/b.list", live_direct))
            .await
            .unwrap();
        assert_eq!(second.origin, FetchOrigin::Mirror);
        assert_eq!(second.payload, vec!["DOMAIN,b.com".to_string()]);
        assert!(direct_requests.lock().unwrap().is_empty());

        let mirror_requests = mirror_requests.lock().unwrap();
        assert_eq!(mirror_requests.len(), 2);
        assert!(mirror_requests[0].starts_with(&format!(
            "GET /{}/a.list ",
            dead_direct.trim_start_matches("http://")
        )));
        assert!(mirror_requests[1].starts_with(&format!(
            "GET /{}/b.list ",
            live_direct.trim_start_matches("http://")
        )));
    }

    #[tokio::test]
    async fn test_not_found_fails_source_without_retry_or_route_switch() {
        let dir = tempfile::tempdir().unwrap();
        let (mirror, mirror_requests) = spawn_origin(Vec::new()).await;
        let (direct, direct_requests) =
            spawn_origin(vec![status_response(404, "Not Found")]).await;
        let config = mirror_config(dir.path(), &mirror, RetryPolicy::Times(2));
        let mut fetcher = RemoteRuleFetcher::new(&config).unwrap();

        let err = fetcher
            .fetch_source(&config, &format!("{}/removed.list", direct))
            .await
            .unwrap_err();
        assert!(matches!(err, RuleMergeError::HttpStatus { status: 404, .. }));
        assert_eq!(fetcher.raw_url_status(), RawUrlStatus::Accessible);
        assert_eq!(direct_requests.lock().unwrap().len(), 1);
        assert!(mirror_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_response_without_etag_drops_stale_record() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), RetryPolicy::Never);
        let (base, requests) = spawn_origin(vec![
            ok_response("DOMAIN,a.com\n", Some("v1")),
            ok_response("DOMAIN,b.com\n", None),
            ok_response("DOMAIN,c.com\n", None),
        ])
        .await;
        let url = format!("{}/a.list", base);
        let mut fetcher = RemoteRuleFetcher::new(&config).unwrap();

        fetcher.fetch_source(&config, &url).await.unwrap();
        let second = fetcher.fetch_source(&config, &url).await.unwrap();
        assert_eq!(second.payload, vec!["DOMAIN,b.com".to_string()]);
        assert!(
            EtagManager::default()
                .load(&config)
                .unwrap()
                .find_record(&url)
                .is_none()
        );

        let third = fetcher.fetch_source(&config, &url).await.unwrap();
        assert_eq!(third.origin, FetchOrigin::Remote);
        assert_eq!(third.payload, vec!["DOMAIN,c.com".to_string()]);

        let requests = requests.lock().unwrap();
        assert!(requests[1].to_ascii_lowercase().contains("if-none-match: \"v1\""));
        assert!(!requests[2].to_ascii_lowercase().contains("if-none-match"));
    }

    #[tokio::test]
    async fn test_unsupported_format_is_rejected_before_request() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), RetryPolicy::Never);
        let mut fetcher = RemoteRuleFetcher::new(&config).unwrap();
        let err = fetcher
            .fetch_source(&config, "http://127.0.0.1:9/rules.json")
            .await
            .unwrap_err();
        assert!(matches!(err, RuleMergeError::UnsupportedFormat(_)));
    }
}
