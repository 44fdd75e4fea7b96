use tracing::{debug, info, warn};

use crate::config::GlobalConfig;
use crate::error::RmResult;
use crate::rule::loader::RemoteRuleFetcher;
use crate::rule::merger::RuleMerger;
use crate::rule::model::{Category, RuleSet};
use crate::rule::parser::{ParsedSource, RuleParser};
use crate::utils::preview_list;

/// 单个分类的加载结果
#[derive(Debug, Clone)]
pub struct CategoryLoad {
    pub category: Category,
    /// None：没有任何规则源成功，本轮跳过该分类
    pub rules: Option<RuleSet>,
    pub sources_ok: usize,
    pub sources_failed: usize,
    /// 无法识别而被跳过的规则行数
    pub skipped_lines: usize,
}

/// 规则加载器：逐个拉取分类下的规则源，解析并合并
pub struct RuleLoader {
    fetcher: RemoteRuleFetcher,
    parser: RuleParser,
    merger: RuleMerger,
}

impl RuleLoader {
    pub fn new(config: &GlobalConfig) -> RmResult<Self> {
        Ok(Self::with_fetcher(RemoteRuleFetcher::new(config)?))
    }

    pub fn with_fetcher(fetcher: RemoteRuleFetcher) -> Self {
        Self {
            fetcher,
            parser: RuleParser,
            merger: RuleMerger,
        }
    }

    /// 加载单个分类：单个规则源失败只记录日志并跳过
    pub async fn load_category(&mut self, config: &GlobalConfig, category: Category) -> CategoryLoad {
        let urls = config.sources_for(category);
        let mut parsed_sources: Vec<ParsedSource> = Vec::with_capacity(urls.len());
        let mut sources_failed = 0;
        let mut skipped_lines = 0;
        debug!("[{}] 规则源：{}", category, preview_list(urls));

        for url in urls {
            debug!("[{}] 开始拉取 {}", category, url);
            match self.fetcher.fetch_source(config, url).await {
                Ok(fetched) => {
                    let parsed = self.parser.parse_entries(&fetched.payload);
                    debug!(
                        "[{}] {} 解析完成：有效 {} 条，跳过 {} 行（来源：{}）",
                        category,
                        url,
                        parsed.entries.len(),
                        parsed.skipped,
                        fetched.origin
                    );
                    skipped_lines += parsed.skipped;
                    parsed_sources.push(parsed);
                }
                Err(e) => {
                    warn!("[{}] 处理规则源失败 {}：{}", category, url, e);
                    sources_failed += 1;
                }
            }
        }

        let sources_ok = parsed_sources.len();
        let rules = if parsed_sources.is_empty() {
            warn!("[{}] 没有可用的规则源，跳过该分类", category);
            None
        } else {
            let merged = self.merger.merge(parsed_sources);
            info!(
                "[{}] 合并完成：{} 个规则源，{} 条规则",
                category,
                sources_ok,
                merged.len()
            );
            Some(merged)
        };

        CategoryLoad {
            category,
            rules,
            sources_ok,
            sources_failed,
            skipped_lines,
        }
    }

    /// 按固定顺序加载全部分类
    pub async fn load_all(&mut self, config: &GlobalConfig) -> Vec<CategoryLoad> {
        let mut loads = Vec::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            loads.push(self.load_category(config, category).await);
        }
        debug!("原始URL可达状态：{:?}", self.fetcher.raw_url_status());
        loads
    }
}
