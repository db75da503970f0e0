use anyhow::Result;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

use crate::config::CacheConfig;
use crate::types::SocialModel;

pub mod facet_cache;
pub mod performance_monitor;
pub use facet_cache::FacetCache;
pub use performance_monitor::{CachePerformanceMonitor, CachePerformanceReport};

/// 缓存分类
pub struct CacheCategory;

impl CacheCategory {
    pub const SEARCH: &'static str = "search";
}

/// 缓存管理器
pub struct CacheManager {
    config: CacheConfig,
    performance_monitor: CachePerformanceMonitor,
}

/// 缓存条目
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: u64,
    /// 缓存键的MD5哈希值
    pub key_hash: String,
    /// 命中次数
    #[serde(default)]
    pub hit_count: u64,
}

/// 搜索缓存记录：同一段描述此前的发现结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCacheRecord {
    /// 归一化后的描述文本
    pub description: String,
    pub social_model: SocialModel,
    pub facets: Vec<String>,
    /// 此前发现并持久化的人物
    pub figure_names: Vec<String>,
}

/// 归一化描述文本：折叠空白并转小写
pub fn normalize_search_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            performance_monitor: CachePerformanceMonitor::new(),
        }
    }

    /// 生成缓存键的MD5哈希
    pub fn hash_key(&self, key: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// 请求指纹：归一化描述文本的哈希
    pub fn fingerprint(&self, description: &str) -> String {
        self.hash_key(&normalize_search_text(description))
    }

    /// 获取缓存文件路径
    fn get_cache_path(&self, category: &str, hash: &str) -> PathBuf {
        self.config
            .cache_dir
            .join(category)
            .join(format!("{}.json", hash))
    }

    fn now_seconds() -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }

    /// 检查缓存是否过期
    fn is_expired(&self, timestamp: u64) -> bool {
        let expire_seconds = self.config.expire_hours * 3600;
        Self::now_seconds().saturating_sub(timestamp) > expire_seconds
    }

    /// 获取缓存，命中时累加命中次数
    pub async fn get<T>(&self, category: &str, key: &str) -> Result<Option<T>>
    where
        T: Serialize + for<'de> Deserialize<'de>,
    {
        if !self.config.enabled {
            return Ok(None);
        }

        let hash = self.hash_key(key);
        let cache_path = self.get_cache_path(category, &hash);

        if !cache_path.exists() {
            self.performance_monitor.record_cache_miss(category);
            return Ok(None);
        }

        match fs::read_to_string(&cache_path).await {
            Ok(content) => match serde_json::from_str::<CacheEntry<T>>(&content) {
                Ok(mut entry) => {
                    if self.is_expired(entry.timestamp) {
                        // 删除过期缓存
                        let _ = fs::remove_file(&cache_path).await;
                        self.performance_monitor.record_cache_miss(category);
                        return Ok(None);
                    }

                    entry.hit_count += 1;
                    self.performance_monitor
                        .record_cache_hit(category, entry.hit_count);

                    if let Ok(updated) = serde_json::to_string_pretty(&entry)
                        && let Err(e) = fs::write(&cache_path, updated).await
                    {
                        self.performance_monitor
                            .record_cache_error(category, &format!("更新命中次数失败: {}", e));
                    }
                    Ok(Some(entry.data))
                }
                Err(e) => {
                    self.performance_monitor
                        .record_cache_error(category, &format!("反序列化失败: {}", e));
                    Ok(None)
                }
            },
            Err(e) => {
                self.performance_monitor
                    .record_cache_error(category, &format!("读取文件失败: {}", e));
                Ok(None)
            }
        }
    }

    /// 设置缓存
    pub async fn set<T>(&self, category: &str, key: &str, data: T) -> Result<()>
    where
        T: Serialize,
    {
        if !self.config.enabled {
            return Ok(());
        }

        let hash = self.hash_key(key);
        let cache_path = self.get_cache_path(category, &hash);

        // 确保目录存在
        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let entry = CacheEntry {
            data,
            timestamp: Self::now_seconds(),
            key_hash: hash,
            hit_count: 0,
        };

        match serde_json::to_string_pretty(&entry) {
            Ok(content) => match fs::write(&cache_path, content).await {
                Ok(_) => {
                    self.performance_monitor.record_cache_write(category);
                    Ok(())
                }
                Err(e) => {
                    self.performance_monitor
                        .record_cache_error(category, &format!("写入文件失败: {}", e));
                    Err(e.into())
                }
            },
            Err(e) => {
                self.performance_monitor
                    .record_cache_error(category, &format!("序列化失败: {}", e));
                Err(e.into())
            }
        }
    }

    /// 按描述查找搜索缓存
    pub async fn get_search(&self, description: &str) -> Result<Option<SearchCacheRecord>> {
        self.get::<SearchCacheRecord>(CacheCategory::SEARCH, &normalize_search_text(description))
            .await
    }

    /// 写入搜索缓存
    pub async fn set_search(&self, record: SearchCacheRecord) -> Result<()> {
        let key = normalize_search_text(&record.description);
        self.set(CacheCategory::SEARCH, &key, record).await
    }

    /// 生成性能报告
    pub fn generate_performance_report(&self) -> CachePerformanceReport {
        self.performance_monitor.generate_report()
    }
}
