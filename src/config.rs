//! 全局配置管理，存储所有可配置项
//! 支持默认值、链式构建器以及 JSON 配置文件（字段均可省略）

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RmResult, RuleMergeError};
use crate::rule::model::Category;

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryPolicy {
    Never,     // 不重试
    Times(u8), // 固定次数重试（不含第一次）
}

impl RetryPolicy {
    pub fn max_retries(&self) -> usize {
        match self {
            RetryPolicy::Never => 0,
            RetryPolicy::Times(n) => *n as usize,
        }
    }
}

/// GitHub Pages 站点信息，用于生成 README 中的链接
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub owner: String,
    pub repo: String,
}

impl SiteConfig {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// 解析 GITHUB_REPOSITORY 形式的 "owner/repo"
    pub fn from_github_repository(value: &str) -> RmResult<Self> {
        match value.trim().split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok(Self::new(owner, repo))
            }
            _ => Err(RuleMergeError::InvalidInput(format!(
                "仓库标识应为 owner/repo 格式：{}",
                value
            ))),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.owner.is_empty() && !self.repo.is_empty()
    }

    /// https://{owner}.github.io/{repo}/{file}
    pub fn page_url(&self, file: &str) -> String {
        format!("https://{}.github.io/{}/{}", self.owner, self.repo, file)
    }
}

/// git 发布配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub remote: String,
    pub branch: String,
    pub author_name: String,
    pub author_email: String,
    pub commit_message: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            branch: "main".to_string(),
            author_name: "github-actions[bot]".to_string(),
            author_email: "41898282+github-actions[bot]@users.noreply.github.com".to_string(),
            commit_message: "Update merged rules".to_string(),
        }
    }
}

/// 全局配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    // 输出目录（规则文件与 README）
    pub output_dir: PathBuf,
    // 规则源缓存目录
    pub cache_dir: PathBuf,
    // 是否启用 ETag 缓存
    pub use_cache: bool,
    // 拉取失败时是否回退到过期缓存
    pub offline_fallback: bool,
    // 超时配置（单位：秒）
    pub http_timeout: u64,
    pub retry: RetryPolicy,
    // GitHub代理URL，None 表示不使用镜像
    pub gh_proxy_url: Option<String>,
    // 可通过镜像访问的域名
    pub mirror_hosts: Vec<String>,
    pub user_agent: String,
    // 分类 → 规则源 URL 列表
    pub sources: BTreeMap<Category, Vec<String>>,
    // 分类 → .conf 中使用的策略名（缺省用 Category::default_policy）
    pub policies: BTreeMap<Category, String>,
    pub site: SiteConfig,
    pub publish: PublishConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            cache_dir: PathBuf::from(".cache/rulemerge"),
            use_cache: true,
            offline_fallback: true,
            http_timeout: 30,
            retry: RetryPolicy::Times(2),
            gh_proxy_url: Some("https://ghfast.top/".to_string()),
            mirror_hosts: default_mirror_hosts(),
            user_agent: concat!("rulemerge/", env!("CARGO_PKG_VERSION")).to_string(),
            sources: default_sources(),
            policies: BTreeMap::new(),
            site: SiteConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// 从 JSON 配置文件加载，未给出的字段使用默认值
    pub fn from_json_file(path: impl AsRef<Path>) -> RmResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RuleMergeError::InvalidInput(format!("读取配置文件失败: {} - {}", path.display(), e))
        })?;
        let config: GlobalConfig = serde_json::from_str(&content)?;
        debug!(
            "已加载配置文件 {}，分类数：{}",
            path.display(),
            config.sources.len()
        );
        Ok(config)
    }

    /// 分类使用的策略名
    pub fn policy_for(&self, category: Category) -> &str {
        self.policies
            .get(&category)
            .map(String::as_str)
            .unwrap_or_else(|| category.default_policy())
    }

    /// 分类配置的规则源（未配置返回空）
    pub fn sources_for(&self, category: Category) -> &[String] {
        self.sources
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// 默认可走镜像的 GitHub 内容域名
pub fn default_mirror_hosts() -> Vec<String> {
    [
        "raw.githubusercontent.com",
        "github.com",
        "gist.githubusercontent.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// 默认规则源
pub fn default_sources() -> BTreeMap<Category, Vec<String>> {
    const PROXY: &[&str] =
        &["https://raw.githubusercontent.com/Loyalsoldier/clash-rules/release/proxy.txt"];
    const DIRECT: &[&str] = &[
        "https://raw.githubusercontent.com/Loyalsoldier/clash-rules/release/direct.txt",
        "https://raw.githubusercontent.com/blackmatrix7/ios_rule_script/master/rule/Clash/Download/Download.list",
        "https://raw.githubusercontent.com/blackmatrix7/ios_rule_script/master/rule/Clash/ChinaMax/ChinaMax.list",
        "https://raw.githubusercontent.com/blackmatrix7/ios_rule_script/master/rule/Clash/Direct/Direct.list",
        "https://raw.githubusercontent.com/ACL4SSR/ACL4SSR/master/Clash/ChinaDomain.list",
        "https://raw.githubusercontent.com/ACL4SSR/ACL4SSR/master/Clash/ChinaCompanyIp.list",
        "https://raw.githubusercontent.com/ACL4SSR/ACL4SSR/master/Clash/ChinaIp.list",
        "https://raw.githubusercontent.com/ACL4SSR/ACL4SSR/master/Clash/LocalAreaNetwork.list",
        "https://raw.githubusercontent.com/Aethersailor/Custom_OpenClash_Rules/main/Rule/Custom_Direct.list",
    ];
    const REJECT: &[&str] =
        &["https://raw.githubusercontent.com/Loyalsoldier/clash-rules/release/reject.txt"];
    const AI: &[&str] = &[
        "https://raw.githubusercontent.com/blackmatrix7/ios_rule_script/master/rule/Clash/Copilot/Copilot.list",
        "https://raw.githubusercontent.com/blackmatrix7/ios_rule_script/master/rule/Clash/OpenAI/OpenAI.list",
    ];

    [
        (Category::Proxy, PROXY),
        (Category::Direct, DIRECT),
        (Category::Reject, REJECT),
        (Category::Ai, AI),
    ]
    .into_iter()
    .map(|(category, urls)| (category, urls.iter().map(|u| u.to_string()).collect()))
    .collect()
}

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取默认配置
    pub fn get_default() -> GlobalConfig {
        GlobalConfig::default()
    }

    /// 自定义配置
    pub fn custom() -> CustomConfigBuilder {
        CustomConfigBuilder::new()
    }
}

/// 配置构建器（链式 API）
#[derive(Debug, Clone)]
pub struct CustomConfigBuilder {
    config: GlobalConfig,
}

impl Default for CustomConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: GlobalConfig::default(),
        }
    }

    /// 以已有配置（如配置文件）为起点
    pub fn from_config(config: GlobalConfig) -> Self {
        Self { config }
    }

    pub fn output_dir(mut self, path: PathBuf) -> Self {
        self.config.output_dir = path;
        self
    }

    pub fn cache_dir(mut self, path: PathBuf) -> Self {
        self.config.cache_dir = path;
        self
    }

    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.config.use_cache = enabled;
        self
    }

    pub fn offline_fallback(mut self, enabled: bool) -> Self {
        self.config.offline_fallback = enabled;
        self
    }

    pub fn http_timeout(mut self, timeout: u64) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn gh_proxy_url(mut self, url: Option<String>) -> Self {
        self.config.gh_proxy_url = url;
        self
    }

    pub fn mirror_hosts(mut self, hosts: Vec<String>) -> Self {
        self.config.mirror_hosts = hosts;
        self
    }

    /// 替换某分类的规则源
    pub fn sources(mut self, category: Category, urls: Vec<String>) -> Self {
        self.config.sources.insert(category, urls);
        self
    }

    pub fn clear_sources(mut self) -> Self {
        self.config.sources.clear();
        self
    }

    pub fn policy(mut self, category: Category, policy: impl Into<String>) -> Self {
        self.config.policies.insert(category, policy.into());
        self
    }

    pub fn site(mut self, site: SiteConfig) -> Self {
        self.config.site = site;
        self
    }

    pub fn publish(mut self, publish: PublishConfig) -> Self {
        self.config.publish = publish;
        self
    }

    pub fn build(self) -> GlobalConfig {
        self.config
    }
}
