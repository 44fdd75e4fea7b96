//! 规则模块：负责规则的数据模型、解析、合并、缓存与加载
pub mod cache;
pub mod loader;
pub mod merger;
pub mod model;
pub mod parser;

// 导出核心接口
pub use self::cache::{CachedSource, SourceCacheManager};
pub use self::loader::{CategoryLoad, FetchOrigin, FetchedSource, RemoteRuleFetcher, RuleLoader};
pub use self::merger::{MergedConfig, MergedSection, RuleMerger};
pub use self::model::{Category, RuleEntry, RuleKey, RuleKind, RuleSet, SourceFormat};
pub use self::parser::{ParsedSource, RuleParser};
