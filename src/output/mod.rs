//! 输出模块：规则文件渲染与写入、README 生成
pub mod readme;
pub mod writer;

pub use readme::{ReadmeGenerator, beijing_now};
pub use writer::{MERGED_CONF_FILE, RuleWriter, WrittenCategory, published_files};
