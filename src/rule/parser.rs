//! 规则源解析
//! 1. 根据 URL 扩展名识别文件格式
//! 2. 将原始内容解析为 payload 行（YAML / 文本）
//! 3. 将 payload 行转换为带类型的 RuleEntry

use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{RmResult, RuleMergeError};
use crate::rule::model::{RuleEntry, RuleKind, SourceFormat};
use crate::utils::preview_compact;

/// 经典规则行的关键字（如 DOMAIN-SUFFIX）
static KEYWORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*(?:-[A-Za-z0-9]+)*$").unwrap());

/// 裸域名条目
static BARE_DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:[a-z0-9_](?:[a-z0-9_-]*[a-z0-9_])?\.)*[a-z0-9_](?:[a-z0-9_-]*[a-z0-9_])?$")
        .unwrap()
});

/// 作为规则行末尾出现时直接丢弃的策略名
const KNOWN_POLICIES: &[&str] = &[
    "PROXY",
    "DIRECT",
    "REJECT",
    "REJECT-DROP",
    "REJECT-TINYGIF",
    "REJECT-NO-DROP",
    "PASS",
];

/// 规则行末尾允许保留的参数，其余字段视为策略组名丢弃
const RULE_OPTIONS: &[&str] = &["no-resolve", "extended-matching", "src", "pre-matching"];

/// 兜底规则，不进入合并结果
const CATCH_ALL_KEYWORDS: &[&str] = &["MATCH", "FINAL"];

/// Clash rule-provider 文档
#[derive(Debug, Deserialize)]
struct ProviderDocument {
    #[serde(default)]
    payload: Vec<serde_yaml::Value>,
}

/// 单个规则源的解析结果
#[derive(Debug, Default)]
pub struct ParsedSource {
    pub entries: Vec<RuleEntry>,
    /// 无法识别而被跳过的行数
    pub skipped: usize,
}

impl SourceFormat {
    /// 根据 URL 路径扩展名识别格式
    pub fn from_url(url: &str) -> RmResult<SourceFormat> {
        let parsed = Url::parse(url)?;
        let path = parsed.path();
        let file_name = path.rsplit('/').next().unwrap_or_default();
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "yml" | "yaml" => Ok(SourceFormat::Yaml),
            "txt" | "list" => Ok(SourceFormat::Text),
            other => Err(RuleMergeError::UnsupportedFormat(format!(
                "扩展名 .{} ({})",
                other, url
            ))),
        }
    }
}

/// 规则解析器（无状态工具类）
#[derive(Debug, Default)]
pub struct RuleParser;

impl RuleParser {
    /// 原始内容 → payload 行（已去除空行与注释）
    pub fn parse_payload(&self, content: &str, format: SourceFormat) -> RmResult<Vec<String>> {
        match format {
            SourceFormat::Yaml => self.parse_yaml_payload(content),
            SourceFormat::Text => Ok(self.parse_text_payload(content)),
        }
    }

    fn parse_yaml_payload(&self, content: &str) -> RmResult<Vec<String>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let document: ProviderDocument = serde_yaml::from_str(content)?;
        let payload = document
            .payload
            .into_iter()
            .filter_map(|item| match item {
                serde_yaml::Value::String(s) => Some(s),
                serde_yaml::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(payload)
    }

    /// 文本格式：每行一条；兼容以 .txt 发布的 payload 文档
    fn parse_text_payload(&self, content: &str) -> Vec<String> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !is_comment(line))
            .filter(|line| !line.eq_ignore_ascii_case("payload:"))
            .map(|line| {
                let item = line.strip_prefix('-').map(str::trim).unwrap_or(line);
                strip_quotes(item).to_string()
            })
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// payload 行 → RuleEntry，无法识别的行计入 skipped
    pub fn parse_entries(&self, payload: &[String]) -> ParsedSource {
        let mut parsed = ParsedSource::default();
        for line in payload {
            match self.parse_entry(line) {
                Ok(entry) => parsed.entries.push(entry),
                Err(e) => {
                    debug!("跳过规则行 [{}]：{}", preview_compact(line, 80), e);
                    parsed.skipped += 1;
                }
            }
        }
        parsed
    }

    /// 解析单行规则
    pub fn parse_entry(&self, line: &str) -> RmResult<RuleEntry> {
        let line = strip_quotes(line.trim());
        if line.is_empty() {
            return Err(RuleMergeError::RuleParseError("空规则".to_string()));
        }

        match line.split_once(',') {
            Some((keyword, rest)) if KEYWORD_RE.is_match(keyword.trim()) => {
                self.parse_classical(keyword.trim(), rest)
            }
            _ => self.parse_bare(line),
        }
    }

    /// KIND,value[,options...]
    fn parse_classical(&self, keyword: &str, rest: &str) -> RmResult<RuleEntry> {
        if CATCH_ALL_KEYWORDS
            .iter()
            .any(|k| k.eq_ignore_ascii_case(keyword))
        {
            return Err(RuleMergeError::RuleParseError(format!(
                "兜底规则 {} 不参与合并",
                keyword
            )));
        }

        let kind = RuleKind::from_keyword(keyword);
        if kind.is_logical() {
            return self.parse_logical(kind, rest);
        }

        let mut fields = rest.split(',').map(str::trim);
        let value = fields.next().unwrap_or_default();
        if value.is_empty() {
            return Err(RuleMergeError::RuleParseError(format!(
                "{} 规则缺少值",
                keyword
            )));
        }

        let mut entry = normalize(kind, value)?;
        for field in fields.filter(|f| !f.is_empty()) {
            match rule_option(field) {
                Some(option) => {
                    entry.options.insert(option.to_string());
                }
                None if is_known_policy(field) => {}
                None => debug!("丢弃规则 {} 末尾字段：{}", entry, field),
            }
        }
        Ok(entry)
    }

    /// AND/OR/NOT 的值中含有逗号，整体保留，仅去掉末尾策略（组）
    fn parse_logical(&self, kind: RuleKind, rest: &str) -> RmResult<RuleEntry> {
        let mut value = rest.trim();
        if let Some((head, tail)) = value.rsplit_once(',') {
            if head.trim_end().ends_with(')') && !tail.trim().ends_with(')') {
                value = head.trim_end();
            }
        }
        if !(value.starts_with('(') && value.ends_with(')')) {
            return Err(RuleMergeError::RuleParseError(format!(
                "逻辑规则格式错误：{}",
                value
            )));
        }
        Ok(RuleEntry::new(kind, value))
    }

    /// 裸条目：+.domain / .domain / *.domain / domain / CIDR / IP
    fn parse_bare(&self, item: &str) -> RmResult<RuleEntry> {
        if let Some(domain) = item.strip_prefix("+.").or_else(|| item.strip_prefix('.')) {
            return normalize(RuleKind::DomainSuffix, domain);
        }
        if item.contains('*') {
            return normalize(RuleKind::DomainWildcard, item);
        }
        if item.contains('/') || IpAddr::from_str(item).is_ok() {
            return normalize(RuleKind::IpCidr, item);
        }
        if BARE_DOMAIN_RE.is_match(item) {
            return normalize(RuleKind::DomainSuffix, item);
        }
        Err(RuleMergeError::RuleParseError(format!(
            "无法识别的规则条目：{}",
            item
        )))
    }
}

/// 值归一化：域名小写去尾点，CIDR 规整为网络地址并按地址族修正类型
fn normalize(kind: RuleKind, value: &str) -> RmResult<RuleEntry> {
    match kind {
        RuleKind::IpCidr | RuleKind::IpCidr6 => {
            let net = parse_network(value)?;
            let kind = match net {
                IpNet::V4(_) => RuleKind::IpCidr,
                IpNet::V6(_) => RuleKind::IpCidr6,
            };
            Ok(RuleEntry::new(kind, net.trunc().to_string()))
        }
        _ if kind.is_domain_like() => {
            let mut domain = value.trim().trim_end_matches('.').to_ascii_lowercase();
            if kind == RuleKind::DomainSuffix {
                domain = domain.trim_start_matches('.').to_string();
            }
            if domain.is_empty() {
                return Err(RuleMergeError::RuleParseError(format!(
                    "{} 规则域名为空",
                    kind
                )));
            }
            Ok(RuleEntry::new(kind, domain))
        }
        _ => Ok(RuleEntry::new(kind, value.trim())),
    }
}

fn parse_network(value: &str) -> RmResult<IpNet> {
    let value = value.trim();
    if let Ok(net) = IpNet::from_str(value) {
        return Ok(net);
    }
    let addr = IpAddr::from_str(value)
        .map_err(|_| RuleMergeError::RuleParseError(format!("无效的 IP 网段：{}", value)))?;
    let prefix = if addr.is_ipv4() { 32 } else { 128 };
    IpNet::new(addr, prefix)
        .map_err(|e| RuleMergeError::RuleParseError(format!("无效的 IP 网段 {}：{}", value, e)))
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with("//") || line.starts_with(';')
}

fn rule_option(field: &str) -> Option<&'static str> {
    RULE_OPTIONS
        .iter()
        .copied()
        .find(|o| o.eq_ignore_ascii_case(field))
}

fn is_known_policy(field: &str) -> bool {
    KNOWN_POLICIES.iter().any(|p| p.eq_ignore_ascii_case(field))
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    for quote in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}
