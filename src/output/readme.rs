//! README 生成：每个发布文件一行 GitHub Pages 链接 + 一行北京时间更新时间

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tracing::info;

use crate::config::{GlobalConfig, SiteConfig};
use crate::error::{RmResult, RuleMergeError};
use crate::output::writer::published_files;

/// UTC+8
const BEIJING_OFFSET_SECS: i32 = 8 * 3600;

pub const README_FILE: &str = "README.md";

/// 时间戳行前缀（每个 README 恰好一行）
pub const TIMESTAMP_PREFIX: &str = "Last updated (Beijing Time, UTC+8): ";

fn beijing_offset() -> FixedOffset {
    FixedOffset::east_opt(BEIJING_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// 当前北京时间
pub fn beijing_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&beijing_offset())
}

pub struct ReadmeGenerator;

impl ReadmeGenerator {
    pub fn render(site: &SiteConfig, updated_at: DateTime<FixedOffset>) -> String {
        let beijing = updated_at.with_timezone(&beijing_offset());
        let mut out = String::new();
        let _ = writeln!(out, "# {}", site.repo);
        out.push('\n');
        out.push_str(
            "Merged and deduplicated rule lists (Proxy / Direct / Reject / Ai), regenerated weekly.\n",
        );
        out.push('\n');
        let _ = writeln!(
            out,
            "{}{}",
            TIMESTAMP_PREFIX,
            beijing.format("%Y-%m-%d %H:%M:%S")
        );
        out.push('\n');
        out.push_str("## Rule files\n\n");
        for file in published_files() {
            let _ = writeln!(out, "- {}: {}", file, site.page_url(&file));
        }
        out
    }

    /// 写入 <output_dir>/README.md
    pub async fn write(
        config: &GlobalConfig,
        updated_at: DateTime<FixedOffset>,
    ) -> RmResult<PathBuf> {
        if !config.site.is_complete() {
            return Err(RuleMergeError::InvalidInput(
                "生成 README 需要 owner 与 repo（--owner/--repo 或 GITHUB_REPOSITORY）".to_string(),
            ));
        }
        tokio::fs::create_dir_all(&config.output_dir).await?;
        let path = config.output_dir.join(README_FILE);
        tokio::fs::write(&path, Self::render(&config.site, updated_at)).await?;
        info!("README 已更新：{}", path.display());
        Ok(path)
    }
}
