//! 规则文件渲染与写入
//! - <Category>.txt：Clash domain 行为 rule-provider
//! - <Category>.conf：Surge 风格 [Rule] 片段
//! - merged_rules.conf：全部分类的合并配置

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::GlobalConfig;
use crate::error::RmResult;
use crate::rule::{Category, MergedConfig, RuleSet};

/// 合并配置文件名
pub const MERGED_CONF_FILE: &str = "merged_rules.conf";

/// 发布的五个固定文件，按固定顺序
pub fn published_files() -> Vec<String> {
    Category::ALL
        .iter()
        .map(|c| c.txt_file_name())
        .chain(std::iter::once(MERGED_CONF_FILE.to_string()))
        .collect()
}

/// 单个分类的写入结果
#[derive(Debug, Clone)]
pub struct WrittenCategory {
    pub txt_path: PathBuf,
    pub conf_path: PathBuf,
    /// 写入 .txt 的条目数
    pub provider_items: usize,
    /// 无法在 .txt 中表达而省略的非域名规则数
    pub omitted: usize,
}

pub struct RuleWriter;

impl RuleWriter {
    /// 渲染 rule-provider payload，返回 (内容, 省略条数)
    pub fn render_txt(rules: &RuleSet) -> (String, usize) {
        let mut out = String::from("payload:\n");
        let mut omitted = 0;
        for entry in rules.iter() {
            match entry.to_provider_item() {
                Some(item) => {
                    let _ = writeln!(out, "  - '{}'", item.replace('\'', "''"));
                }
                None => omitted += 1,
            }
        }
        (out, omitted)
    }

    pub fn render_conf(rules: &RuleSet, policy: &str) -> String {
        let mut out = String::from("[Rule]\n");
        for entry in rules.iter() {
            out.push_str(&entry.to_conf_line(policy));
            out.push('\n');
        }
        out
    }

    /// [Rule] 之后每个分类一个以注释开头的段落
    pub fn render_merged(merged: &MergedConfig, config: &GlobalConfig) -> String {
        let mut out = String::from("[Rule]\n");
        for section in &merged.sections {
            let policy = config.policy_for(section.category);
            let _ = writeln!(out, "# {}", section.category);
            for entry in section.rules.iter() {
                out.push_str(&entry.to_conf_line(policy));
                out.push('\n');
            }
        }
        out
    }

    /// 写入分类的 .txt 与 .conf
    pub async fn write_category(
        config: &GlobalConfig,
        category: Category,
        rules: &RuleSet,
    ) -> RmResult<WrittenCategory> {
        tokio::fs::create_dir_all(&config.output_dir).await?;

        let (txt, omitted) = Self::render_txt(rules);
        let txt_path = config.output_dir.join(category.txt_file_name());
        tokio::fs::write(&txt_path, txt).await?;
        info!("Generated {}", txt_path.display());

        let conf = Self::render_conf(rules, config.policy_for(category));
        let conf_path = config.output_dir.join(category.conf_file_name());
        tokio::fs::write(&conf_path, conf).await?;
        info!("Generated {}", conf_path.display());

        if omitted > 0 {
            debug!("[{}] {} 条非域名规则无法写入 .txt，仅保留在 .conf", category, omitted);
        }

        Ok(WrittenCategory {
            txt_path,
            conf_path,
            provider_items: rules.len() - omitted,
            omitted,
        })
    }

    pub async fn write_merged(config: &GlobalConfig, merged: &MergedConfig) -> RmResult<PathBuf> {
        tokio::fs::create_dir_all(&config.output_dir).await?;
        let path = config.output_dir.join(MERGED_CONF_FILE);
        tokio::fs::write(&path, Self::render_merged(merged, config)).await?;
        info!(
            "Generated {}（{} 个分类，{} 条规则）",
            path.display(),
            merged.sections.len(),
            merged.total_rules()
        );
        Ok(path)
    }

    /// 确保五个发布文件存在：缺失则创建空文件，已存在的不截断
    /// 返回本次新建的文件
    pub async fn ensure_outputs(output_dir: &Path) -> RmResult<Vec<PathBuf>> {
        tokio::fs::create_dir_all(output_dir).await?;
        let mut created = Vec::new();
        for file in published_files() {
            let path = output_dir.join(&file);
            let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            if !existed {
                debug!("创建空输出文件 {}", path.display());
                created.push(path);
            }
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigManager;
    use crate::rule::{RuleEntry, RuleKind, RuleMerger};
    use std::collections::BTreeMap;

    fn sample_rules() -> RuleSet {
        vec![
            RuleEntry::new(RuleKind::DomainSuffix, "openai.com"),
            RuleEntry::new(RuleKind::Domain, "chat.openai.com"),
            RuleEntry::new(RuleKind::DomainKeyword, "openai"),
            RuleEntry::new(RuleKind::IpCidr, "10.0.0.0/8").with_option("no-resolve"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_published_files_fixed_order() {
        assert_eq!(
            published_files(),
            vec!["Proxy.txt", "Direct.txt", "Reject.txt", "Ai.txt", "merged_rules.conf"]
        );
    }

    #[test]
    fn test_render_txt_only_domain_items() {
        let (txt, omitted) = RuleWriter::render_txt(&sample_rules());
        assert_eq!(
            txt,
            "payload:\n  - 'chat.openai.com'\n  - '+.openai.com'\n"
        );
        assert_eq!(omitted, 2);
    }

    #[test]
    fn test_render_conf_appends_policy() {
        let conf = RuleWriter::render_conf(&sample_rules(), "PROXY");
        assert_eq!(
            conf,
            "[Rule]\n\
             DOMAIN,chat.openai.com,PROXY\n\
             DOMAIN-SUFFIX,openai.com,PROXY\n\
             DOMAIN-KEYWORD,openai,PROXY\n\
             IP-CIDR,10.0.0.0/8,PROXY,no-resolve\n"
        );
    }

    #[test]
    fn test_render_merged_sections() {
        let config = ConfigManager::get_default();
        let mut sets = BTreeMap::new();
        sets.insert(
            Category::Reject,
            vec![RuleEntry::new(RuleKind::DomainSuffix, "ads.com")]
                .into_iter()
                .collect::<RuleSet>(),
        );
        sets.insert(
            Category::Direct,
            vec![
                RuleEntry::new(RuleKind::DomainSuffix, "cn"),
                RuleEntry::new(RuleKind::DomainSuffix, "ads.com"),
            ]
            .into_iter()
            .collect::<RuleSet>(),
        );
        let merged = RuleMerger.merge_categories(&sets);

        let text = RuleWriter::render_merged(&merged, &config);
        assert_eq!(
            text,
            "[Rule]\n\
             # Direct\n\
             DOMAIN-SUFFIX,ads.com,DIRECT\n\
             DOMAIN-SUFFIX,cn,DIRECT\n\
             # Reject\n"
        );
    }

    #[tokio::test]
    async fn test_write_category_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigManager::custom()
            .output_dir(dir.path().join("out"))
            .build();

        let written = RuleWriter::write_category(&config, Category::Ai, &sample_rules())
            .await
            .unwrap();
        assert_eq!(written.provider_items, 2);
        assert_eq!(written.omitted, 2);
        assert!(written.txt_path.ends_with("Ai.txt"));
        let conf = std::fs::read_to_string(&written.conf_path).unwrap();
        assert!(conf.starts_with("[Rule]\n"));
        assert!(conf.contains("DOMAIN-SUFFIX,openai.com,PROXY"));
    }

    #[tokio::test]
    async fn test_ensure_outputs_creates_missing_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Proxy.txt"), "payload:\n  - '+.a.com'\n").unwrap();

        let created = RuleWriter::ensure_outputs(dir.path()).await.unwrap();
        assert_eq!(created.len(), 4);
        for file in published_files() {
            assert!(dir.path().join(&file).exists(), "{}", file);
        }
        assert_eq!(
            std::fs::read_to_string(dir.path().join("Proxy.txt")).unwrap(),
            "payload:\n  - '+.a.com'\n"
        );
        assert_eq!(std::fs::metadata(dir.path().join("Ai.txt")).unwrap().len(), 0);

        let again = RuleWriter::ensure_outputs(dir.path()).await.unwrap();
        assert!(again.is_empty());
    }
}
