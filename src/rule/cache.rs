//! 规则源缓存管理
//! 仅处理单个规则源 payload 的本地序列化（MessagePack）和反序列化

use std::path::PathBuf;

use rmp_serde::{Serializer, from_slice};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GlobalConfig;
use crate::error::{RmResult, RuleMergeError};
use crate::rule::loader::RulePathManager;
use crate::rule::model::SourceFormat;

/// 缓存的规则源（已解析的 payload 行）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSource {
    pub url: String,
    pub format: SourceFormat,
    pub payload: Vec<String>,
    /// 拉取时间（时间戳）
    pub fetched_at: u64,
}

/// 规则源缓存管理器
pub struct SourceCacheManager;

impl SourceCacheManager {
    pub fn cache_path(config: &GlobalConfig, url: &str) -> PathBuf {
        RulePathManager.source_cache_file_path(config, url)
    }

    /// 从本地缓存加载规则源
    pub async fn load_from_cache(config: &GlobalConfig, url: &str) -> RmResult<CachedSource> {
        let cache_path = Self::cache_path(config, url);
        let cache_data = tokio::fs::read(&cache_path).await?;

        // MessagePack反序列化
        let cached: CachedSource = from_slice(&cache_data)?;
        if cached.url != url {
            return Err(RuleMergeError::RuleCacheError(format!(
                "缓存文件 {} 属于其他规则源：{}",
                cache_path.display(),
                cached.url
            )));
        }

        debug!(
            "缓存文件反序列化成功：{}，规则行数：{}",
            url,
            cached.payload.len()
        );
        Ok(cached)
    }

    /// 将规则源缓存到本地，返回缓存文件路径
    pub async fn save_to_cache(config: &GlobalConfig, source: &CachedSource) -> RmResult<PathBuf> {
        let cache_path = Self::cache_path(config, &source.url);
        let mut cache_data = Vec::new();

        // MessagePack序列化
        source.serialize(&mut Serializer::new(&mut cache_data))?;

        debug!(
            "规则源序列化成功，序列化后数据大小：{} 字节",
            cache_data.len()
        );

        tokio::fs::write(&cache_path, cache_data).await?;
        Ok(cache_path)
    }

    /// 清除本地缓存
    pub async fn clear_cache(config: &GlobalConfig, url: &str) -> RmResult<()> {
        let cache_path = Self::cache_path(config, url);
        if cache_path.exists() {
            tokio::fs::remove_file(cache_path).await?;
        }
        Ok(())
    }
}
