//! 规则数据模型定义
//! 仅存储规则数据，支持序列化/反序列化

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RuleMergeError;

/// 规则动作分类（输出文件与策略的划分依据）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Proxy,
    Direct,
    Reject,
    Ai,
}

impl Category {
    /// 固定输出顺序
    pub const ALL: [Category; 4] = [
        Category::Proxy,
        Category::Direct,
        Category::Reject,
        Category::Ai,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Proxy => "Proxy",
            Category::Direct => "Direct",
            Category::Reject => "Reject",
            Category::Ai => "Ai",
        }
    }

    /// Clash rule-provider 文件名（如 Proxy.txt）
    pub fn txt_file_name(&self) -> String {
        format!("{}.txt", self.name())
    }

    /// Surge 风格规则片段文件名（如 Proxy.conf）
    pub fn conf_file_name(&self) -> String {
        format!("{}.conf", self.name())
    }

    /// 未配置时写入 .conf 的默认策略
    pub fn default_policy(&self) -> &'static str {
        match self {
            Category::Proxy | Category::Ai => "PROXY",
            Category::Direct => "DIRECT",
            Category::Reject => "REJECT",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = RuleMergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RuleMergeError::InvalidInput(format!("未知分类：{}", s)))
    }
}

/// 规则类型
/// 枚举顺序即输出排序顺序
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RuleKind {
    Domain,
    DomainSuffix,
    DomainKeyword,
    DomainWildcard,
    DomainRegex,
    IpCidr,
    IpCidr6,
    IpAsn,
    GeoIp,
    ProcessName,
    UserAgent,
    UrlRegex,
    DstPort,
    /// 其他规则类型，原样保留关键字（大写）
    Other(String),
}

impl RuleKind {
    /// 从规则关键字解析（大小写不敏感，兼容 Surge/Quantumult 的别名）
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.trim().to_ascii_uppercase().as_str() {
            "DOMAIN" | "HOST" => RuleKind::Domain,
            "DOMAIN-SUFFIX" | "HOST-SUFFIX" => RuleKind::DomainSuffix,
            "DOMAIN-KEYWORD" | "HOST-KEYWORD" => RuleKind::DomainKeyword,
            "DOMAIN-WILDCARD" | "HOST-WILDCARD" => RuleKind::DomainWildcard,
            "DOMAIN-REGEX" => RuleKind::DomainRegex,
            "IP-CIDR" => RuleKind::IpCidr,
            "IP-CIDR6" | "IP6-CIDR" => RuleKind::IpCidr6,
            "IP-ASN" => RuleKind::IpAsn,
            "GEOIP" => RuleKind::GeoIp,
            "PROCESS-NAME" => RuleKind::ProcessName,
            "USER-AGENT" => RuleKind::UserAgent,
            "URL-REGEX" => RuleKind::UrlRegex,
            "DST-PORT" | "DEST-PORT" => RuleKind::DstPort,
            other => RuleKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RuleKind::Domain => "DOMAIN",
            RuleKind::DomainSuffix => "DOMAIN-SUFFIX",
            RuleKind::DomainKeyword => "DOMAIN-KEYWORD",
            RuleKind::DomainWildcard => "DOMAIN-WILDCARD",
            RuleKind::DomainRegex => "DOMAIN-REGEX",
            RuleKind::IpCidr => "IP-CIDR",
            RuleKind::IpCidr6 => "IP-CIDR6",
            RuleKind::IpAsn => "IP-ASN",
            RuleKind::GeoIp => "GEOIP",
            RuleKind::ProcessName => "PROCESS-NAME",
            RuleKind::UserAgent => "USER-AGENT",
            RuleKind::UrlRegex => "URL-REGEX",
            RuleKind::DstPort => "DST-PORT",
            RuleKind::Other(keyword) => keyword,
        }
    }

    /// 值是否为域名（去重前统一小写）
    pub fn is_domain_like(&self) -> bool {
        matches!(
            self,
            RuleKind::Domain
                | RuleKind::DomainSuffix
                | RuleKind::DomainKeyword
                | RuleKind::DomainWildcard
        )
    }

    /// 逻辑规则（AND/OR/NOT）的值包含逗号，需要整体保留
    pub fn is_logical(&self) -> bool {
        matches!(self, RuleKind::Other(k) if k == "AND" || k == "OR" || k == "NOT")
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 去重键：规则类型 + 归一化后的值
pub type RuleKey = (RuleKind, String);

/// 单条规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub kind: RuleKind,
    pub value: String,
    /// 附加参数（如 no-resolve）
    pub options: BTreeSet<String>,
}

impl RuleEntry {
    pub fn new(kind: RuleKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            options: BTreeSet::new(),
        }
    }

    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.insert(option.into());
        self
    }

    pub fn key(&self) -> RuleKey {
        (self.kind.clone(), self.value.clone())
    }

    /// 渲染为 Clash domain 行为 rule-provider 条目
    /// 非域名规则无法在该格式中表达，返回 None
    pub fn to_provider_item(&self) -> Option<String> {
        match self.kind {
            RuleKind::DomainSuffix => Some(format!("+.{}", self.value)),
            RuleKind::Domain | RuleKind::DomainWildcard => Some(self.value.clone()),
            _ => None,
        }
    }

    /// 渲染为 Surge 风格规则行：KIND,value,POLICY[,options]
    pub fn to_conf_line(&self, policy: &str) -> String {
        let mut line = format!("{},{},{}", self.kind, self.value, policy);
        for option in &self.options {
            line.push(',');
            line.push_str(option);
        }
        line
    }
}

impl fmt::Display for RuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.kind, self.value)?;
        for option in &self.options {
            write!(f, ",{}", option)?;
        }
        Ok(())
    }
}

/// 单个分类的去重有序规则集
/// 不变量：任意两条规则的去重键不同
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    entries: BTreeMap<RuleKey, BTreeSet<String>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入规则，重复键合并附加参数；返回是否为新规则
    pub fn insert(&mut self, entry: RuleEntry) -> bool {
        let RuleEntry {
            kind,
            value,
            options,
        } = entry;
        match self.entries.get_mut(&(kind.clone(), value.clone())) {
            Some(existing) => {
                existing.extend(options);
                false
            }
            None => {
                self.entries.insert((kind, value), options);
                true
            }
        }
    }

    pub fn contains(&self, key: &RuleKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按 (类型, 值) 排序遍历
    pub fn iter(&self) -> impl Iterator<Item = RuleEntry> + '_ {
        self.entries.iter().map(|((kind, value), options)| RuleEntry {
            kind: kind.clone(),
            value: value.clone(),
            options: options.clone(),
        })
    }
}

impl Extend<RuleEntry> for RuleSet {
    fn extend<I: IntoIterator<Item = RuleEntry>>(&mut self, iter: I) {
        for entry in iter {
            self.insert(entry);
        }
    }
}

impl FromIterator<RuleEntry> for RuleSet {
    fn from_iter<I: IntoIterator<Item = RuleEntry>>(iter: I) -> Self {
        let mut set = RuleSet::new();
        set.extend(iter);
        set
    }
}

/// 规则源文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    /// Clash rule-provider YAML（payload 列表）
    Yaml,
    /// 每行一条规则的文本（.txt / .list）
    Text,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Yaml => f.write_str("yaml"),
            SourceFormat::Text => f.write_str("text"),
        }
    }
}
