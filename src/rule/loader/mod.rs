//! 规则加载模块
//! 统一导出规则加载相关组件
pub mod etag;
pub mod etag_manager;
pub mod path_manager;
pub mod remote_fetcher;
pub mod rule_loader;

// 导出 ETag 相关
pub use etag::{ETagRecord, ETagTotalRecord};

// 导出加载器
pub use etag_manager::EtagManager;
pub use path_manager::RulePathManager;
pub use remote_fetcher::{FetchOrigin, FetchedSource, RawUrlStatus, RemoteRuleFetcher};
pub use rule_loader::{CategoryLoad, RuleLoader};
