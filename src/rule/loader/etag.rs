use serde::{Deserialize, Serialize};

/// ETag 记录（单个远程源）
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ETagRecord {
    /// 远程源 URL
    pub source_url: String,
    /// 远程文件 ETag（已去除 W/ 前缀和引号）
    pub etag: String,
    /// 本地缓存文件路径
    pub local_file_path: String,
    /// 最后更新时间（时间戳）
    pub last_update: u64,
}

/// ETag 总记录（序列化到本地文件）
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ETagTotalRecord {
    pub records: Vec<ETagRecord>,
}

impl ETagTotalRecord {
    /// 根据源 URL 查找 ETag 记录
    pub fn find_record(&self, source_url: &str) -> Option<&ETagRecord> {
        self.records.iter().find(|r| r.source_url == source_url)
    }

    /// 添加/更新 ETag 记录
    pub fn upsert_record(&mut self, new_record: ETagRecord) {
        self.remove_record(&new_record.source_url);
        self.records.push(new_record);
    }

    /// 移除 ETag 记录，返回是否存在
    pub fn remove_record(&mut self, source_url: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.source_url != source_url);
        self.records.len() != before
    }
}

/// 清理 ETag（移除 W/ 前缀和引号）
pub fn clean_etag(raw: &str) -> String {
    raw.trim().trim_start_matches("W/").trim_matches('"').to_string()
}
