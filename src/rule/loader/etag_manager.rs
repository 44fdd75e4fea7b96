use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::config::GlobalConfig;
use crate::error::RmResult;
use crate::rule::loader::etag::{ETagRecord, ETagTotalRecord};
use crate::rule::loader::path_manager::RulePathManager;

/// ETag 记录管理器
/// 调用方每个规则源读取一次记录表，在内存中修改后按需写回
#[derive(Default)]
pub struct EtagManager {
    path_manager: RulePathManager,
}

impl EtagManager {
    /// 读取记录表，文件不存在时返回空表
    pub fn load(&self, config: &GlobalConfig) -> RmResult<ETagTotalRecord> {
        let etag_path = self.path_manager.get_etag_record_path(config);
        if !etag_path.exists() {
            return Ok(ETagTotalRecord::default());
        }
        Ok(serde_json::from_str(&fs::read_to_string(&etag_path)?)?)
    }

    pub fn save(&self, config: &GlobalConfig, records: &ETagTotalRecord) -> RmResult<()> {
        let etag_path = self.path_manager.get_etag_record_path(config);
        fs::write(&etag_path, serde_json::to_string_pretty(records)?)?;
        debug!("ETag save to：{}", etag_path.display());
        Ok(())
    }

    /// 记录一次成功拉取：有 ETag 则更新，无 ETag 则移除旧记录
    /// 记录表无变化时不写盘
    pub fn record_fetch(
        &self,
        config: &GlobalConfig,
        records: &mut ETagTotalRecord,
        source_url: &str,
        etag: Option<String>,
        local_file_path: String,
    ) -> RmResult<()> {
        let changed = match etag {
            Some(etag) => {
                records.upsert_record(ETagRecord {
                    source_url: source_url.to_string(),
                    etag,
                    local_file_path,
                    last_update: SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs(),
                });
                true
            }
            None => records.remove_record(source_url),
        };
        if changed {
            self.save(config, records)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigManager;

    #[test]
    fn test_record_fetch_updates_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigManager::custom()
            .cache_dir(dir.path().join("cache"))
            .build();
        let manager = EtagManager::default();

        let mut records = manager.load(&config).unwrap();
        assert!(records.find_record("u").is_none());

        manager
            .record_fetch(&config, &mut records, "u", Some("e1".to_string()), "f".to_string())
            .unwrap();
        manager
            .record_fetch(&config, &mut records, "u", Some("e2".to_string()), "f".to_string())
            .unwrap();
        let on_disk = manager.load(&config).unwrap();
        assert_eq!(on_disk.records.len(), 1);
        assert_eq!(on_disk.find_record("u").unwrap().etag, "e2");

        // 新响应没有 ETag：旧记录必须失效
        manager
            .record_fetch(&config, &mut records, "u", None, "f".to_string())
            .unwrap();
        assert!(manager.load(&config).unwrap().find_record("u").is_none());
    }
}
