//! 通用工具
pub mod log_format;

pub use log_format::{preview_compact, preview_list};
