//! 规则合并
//! 分类内：多源并集去重排序
//! 分类间：按固定顺序生成合并配置，同一规则只保留在首个分类中

use std::collections::BTreeMap;

use tracing::debug;

use crate::rule::model::{Category, RuleSet};
use crate::rule::parser::ParsedSource;

/// 合并配置中的单个分类段
#[derive(Debug, Clone)]
pub struct MergedSection {
    pub category: Category,
    pub rules: RuleSet,
    /// 因已出现在更靠前分类而被移除的规则数
    pub shadowed: usize,
}

/// merged_rules.conf 的内容模型
#[derive(Debug, Clone, Default)]
pub struct MergedConfig {
    pub sections: Vec<MergedSection>,
}

impl MergedConfig {
    pub fn total_rules(&self) -> usize {
        self.sections.iter().map(|s| s.rules.len()).sum()
    }
}

#[derive(Debug, Default)]
pub struct RuleMerger;

impl RuleMerger {
    /// 合并同一分类的多个规则源
    pub fn merge<I>(&self, sources: I) -> RuleSet
    where
        I: IntoIterator<Item = ParsedSource>,
    {
        let mut merged = RuleSet::new();
        let mut total = 0usize;
        for source in sources {
            total += source.entries.len();
            merged.extend(source.entries);
        }
        debug!(
            "规则合并完成：输入 {} 条，去重后 {} 条",
            total,
            merged.len()
        );
        merged
    }

    /// 按 Category::ALL 顺序构建合并配置，跨分类去重
    pub fn merge_categories(&self, category_sets: &BTreeMap<Category, RuleSet>) -> MergedConfig {
        let mut seen = RuleSet::new();
        let mut sections = Vec::new();

        for category in Category::ALL {
            let Some(rules) = category_sets.get(&category) else {
                continue;
            };

            let mut section_rules = RuleSet::new();
            let mut shadowed = 0;
            for entry in rules.iter() {
                if seen.contains(&entry.key()) {
                    shadowed += 1;
                    continue;
                }
                seen.insert(entry.clone());
                section_rules.insert(entry);
            }

            if shadowed > 0 {
                debug!("[{}] {} 条规则已存在于更靠前的分类，合并配置中跳过", category, shadowed);
            }
            sections.push(MergedSection {
                category,
                rules: section_rules,
                shadowed,
            });
        }

        MergedConfig { sections }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::model::{RuleEntry, RuleKind};

    fn source(entries: Vec<RuleEntry>) -> ParsedSource {
        ParsedSource {
            entries,
            skipped: 0,
        }
    }

    #[test]
    fn test_merge_union_dedup_sorted() {
        let a = source(vec![
            RuleEntry::new(RuleKind::DomainSuffix, "openai.com"),
            RuleEntry::new(RuleKind::DomainSuffix, "chatgpt.com"),
        ]);
        let b = source(vec![
            RuleEntry::new(RuleKind::DomainSuffix, "openai.com"),
            RuleEntry::new(RuleKind::Domain, "api.github.com"),
        ]);

        let merged = RuleMerger.merge(vec![a, b]);
        let lines: Vec<String> = merged.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "DOMAIN,api.github.com",
                "DOMAIN-SUFFIX,chatgpt.com",
                "DOMAIN-SUFFIX,openai.com",
            ]
        );
    }

    #[test]
    fn test_merge_empty_sources() {
        let merged = RuleMerger.merge(Vec::<ParsedSource>::new());
        assert!(merged.is_empty());
    }

    #[test]
    fn test_merge_categories_first_category_wins() {
        let mut sets = BTreeMap::new();
        sets.insert(
            Category::Ai,
            vec![
                RuleEntry::new(RuleKind::DomainSuffix, "openai.com"),
                RuleEntry::new(RuleKind::DomainSuffix, "anthropic.com"),
            ]
            .into_iter()
            .collect::<RuleSet>(),
        );
        sets.insert(
            Category::Proxy,
            vec![RuleEntry::new(RuleKind::DomainSuffix, "openai.com")]
                .into_iter()
                .collect::<RuleSet>(),
        );

        let merged = RuleMerger.merge_categories(&sets);
        assert_eq!(merged.sections.len(), 2);
        assert_eq!(merged.sections[0].category, Category::Proxy);
        assert_eq!(merged.sections[1].category, Category::Ai);
        assert_eq!(merged.sections[1].rules.len(), 1);
        assert_eq!(merged.sections[1].shadowed, 1);
        assert_eq!(merged.total_rules(), 2);
    }
}
