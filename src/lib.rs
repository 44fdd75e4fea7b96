//! rulemerge - 代理规则列表拉取、合并去重与发布工具

// 导出全局错误类型
pub use self::error::{RmResult, RuleMergeError};

// 导出配置模块
pub use self::config::{
    ConfigManager, CustomConfigBuilder, GlobalConfig, PublishConfig, RetryPolicy, SiteConfig,
};

// 导出规则模块核心接口
pub use self::rule::{
    Category, CategoryLoad, FetchOrigin, MergedConfig, RemoteRuleFetcher, RuleEntry, RuleKind,
    RuleLoader, RuleMerger, RuleParser, RuleSet, SourceFormat,
};

// 导出输出模块核心接口
pub use self::output::{ReadmeGenerator, RuleWriter, published_files};

// 导出流水线与发布
pub use self::pipeline::{CategoryReport, MergeReport, RuleMergePipeline, RunOptions, RunReport};
pub use self::publish::{CommitOutcome, GitPublisher};

// 声明所有子模块
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod publish;
pub mod rule;
pub mod utils;

#[cfg(test)]
mod test_support;
