//! 合并流水线：拉取合并 → 写入规则文件 → 确保发布文件存在 → README → 可选 git 发布
//! 各步骤严格顺序执行

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::error::RmResult;
use crate::output::{ReadmeGenerator, RuleWriter, WrittenCategory, beijing_now, published_files};
use crate::output::readme::README_FILE;
use crate::publish::{CommitOutcome, GitPublisher};
use crate::rule::{Category, RuleLoader, RuleMerger, RuleSet};

/// 单个分类的执行报告
#[derive(Debug, Clone)]
pub struct CategoryReport {
    pub category: Category,
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub skipped_lines: usize,
    /// None：该分类本轮被跳过
    pub written: Option<WrittenCategory>,
    pub rules: usize,
}

/// 合并步骤的输出
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub categories: Vec<CategoryReport>,
    pub merged_path: Option<PathBuf>,
    pub merged_rules: usize,
}

/// 完整运行的输出
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub merge: MergeReport,
    /// ensure 步骤新建的空文件
    pub created_placeholders: Vec<PathBuf>,
    pub readme: Option<PathBuf>,
    pub commit: Option<CommitOutcome>,
}

/// run 步骤开关
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub readme: bool,
    pub publish: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            readme: true,
            publish: false,
        }
    }
}

pub struct RuleMergePipeline {
    config: GlobalConfig,
}

impl RuleMergePipeline {
    pub fn new(config: GlobalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// 规则合并步骤：尽力而为，单个规则源/分类失败不会中断
    pub async fn merge_rules(&self) -> RmResult<MergeReport> {
        let mut loader = RuleLoader::new(&self.config)?;
        let loads = loader.load_all(&self.config).await;

        let mut report = MergeReport::default();
        let mut category_sets: BTreeMap<Category, RuleSet> = BTreeMap::new();

        for load in loads {
            let mut category_report = CategoryReport {
                category: load.category,
                sources_ok: load.sources_ok,
                sources_failed: load.sources_failed,
                skipped_lines: load.skipped_lines,
                written: None,
                rules: 0,
            };

            if let Some(rules) = load.rules {
                let written =
                    RuleWriter::write_category(&self.config, load.category, &rules).await?;
                category_report.rules = rules.len();
                category_report.written = Some(written);
                category_sets.insert(load.category, rules);
            }
            report.categories.push(category_report);
        }

        if category_sets.is_empty() {
            warn!("所有分类均无可用规则，跳过 merged_rules.conf");
        } else {
            let merged = RuleMerger.merge_categories(&category_sets);
            report.merged_rules = merged.total_rules();
            report.merged_path = Some(RuleWriter::write_merged(&self.config, &merged).await?);
        }

        Ok(report)
    }

    /// 确保五个发布文件存在
    pub async fn ensure_outputs(&self) -> RmResult<Vec<PathBuf>> {
        RuleWriter::ensure_outputs(&self.config.output_dir).await
    }

    pub async fn write_readme(&self) -> RmResult<PathBuf> {
        ReadmeGenerator::write(&self.config, beijing_now()).await
    }

    /// 需要提交的文件：五个发布文件 + 已存在的分类 .conf + README
    pub fn publish_files(&self) -> Vec<PathBuf> {
        let dir = &self.config.output_dir;
        let mut files: Vec<PathBuf> = published_files().iter().map(|f| dir.join(f)).collect();
        files.extend(
            Category::ALL
                .iter()
                .map(|c| dir.join(c.conf_file_name()))
                .filter(|p| p.exists()),
        );
        let readme = dir.join(README_FILE);
        if readme.exists() {
            files.push(readme);
        }
        files
    }

    pub async fn publish(&self) -> RmResult<CommitOutcome> {
        let publisher = GitPublisher::new(&self.config.output_dir, self.config.publish.clone());
        publisher.publish(&self.publish_files()).await
    }

    /// 完整运行
    pub async fn run(&self, options: RunOptions) -> RmResult<RunReport> {
        let merge = self.merge_rules().await?;
        let created_placeholders = self.ensure_outputs().await?;

        let readme = if options.readme {
            Some(self.write_readme().await?)
        } else {
            None
        };

        let commit = if options.publish {
            Some(self.publish().await?)
        } else {
            None
        };

        info!(
            "运行完成：{} 个分类已写入，合并配置 {} 条规则",
            merge.categories.iter().filter(|c| c.written.is_some()).count(),
            merge.merged_rules
        );

        Ok(RunReport {
            merge,
            created_placeholders,
            readme,
            commit,
        })
    }
}
