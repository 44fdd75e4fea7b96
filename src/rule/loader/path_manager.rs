use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use crate::config::GlobalConfig;

/// 缓存路径管理器
#[derive(Default)]
pub struct RulePathManager;

impl RulePathManager {
    /// 获取 ETag 记录文件路径（缓存根目录/etag_records.json）
    pub fn get_etag_record_path(&self, config: &GlobalConfig) -> PathBuf {
        self.ensure_cache_dir_exists(config);
        config.cache_dir.join("etag_records.json")
    }

    /// 获取规则源缓存目录（缓存根目录/sources）
    pub fn get_source_cache_dir(&self, config: &GlobalConfig) -> PathBuf {
        let dir = config.cache_dir.join("sources");
        if !dir.exists() {
            let _ = fs::create_dir_all(&dir);
        }
        dir
    }

    /// 规则源缓存文件路径：相同 URL → 相同哈希 → 相同文件名（实现覆盖）
    pub fn source_cache_file_path(&self, config: &GlobalConfig, url: &str) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        let hash = hasher.finish();
        self.get_source_cache_dir(config)
            .join(format!("source_{:016x}.mp", hash))
    }

    /// 统一确保缓存目录存在
    fn ensure_cache_dir_exists(&self, config: &GlobalConfig) {
        let cache_dir = &config.cache_dir;
        if !cache_dir.exists() {
            let _ = fs::create_dir_all(cache_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigManager;

    #[test]
    fn test_source_cache_path_stable_per_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigManager::custom()
            .cache_dir(dir.path().to_path_buf())
            .build();
        let pm = RulePathManager;

        let a1 = pm.source_cache_file_path(&config, "https://example.com/a.list");
        let a2 = pm.source_cache_file_path(&config, "https://example.com/a.list");
        let b = pm.source_cache_file_path(&config, "https://example.com/b.list");
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert!(a1.starts_with(dir.path().join("sources")));
        assert!(dir.path().join("sources").is_dir());
    }
}
