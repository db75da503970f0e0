//! 属性提取结果的内存缓存

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::cache::normalize_search_text;
use crate::config::CacheConfig;
use crate::types::SocialModel;

struct FacetEntry {
    social_model: SocialModel,
    inserted_at: Instant,
}

/// 以归一化描述为键的TTL缓存，满时淘汰最旧的10%
pub struct FacetCache {
    entries: Mutex<HashMap<String, FacetEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl FacetCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.facet_ttl(), config.facet_max_entries)
    }

    pub fn get(&self, description: &str) -> Option<SocialModel> {
        let key = normalize_search_text(description);
        let mut entries = self.entries.lock().ok()?;

        let expired = entries
            .get(&key)
            .map(|entry| entry.inserted_at.elapsed() >= self.ttl)?;
        if expired {
            entries.remove(&key);
            return None;
        }
        entries.get(&key).map(|entry| entry.social_model.clone())
    }

    pub fn put(&self, description: &str, social_model: SocialModel) {
        let key = normalize_search_text(description);
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };

        let ttl = self.ttl;
        entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let evict_count = (self.max_entries / 10).max(1);
            let mut by_age: Vec<(String, Instant)> = entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.inserted_at))
                .collect();
            by_age.sort_by_key(|(_, inserted_at)| *inserted_at);
            for (old_key, _) in by_age.into_iter().take(evict_count) {
                entries.remove(&old_key);
            }
            tracing::debug!("🧹 属性缓存已满，淘汰 {} 条最旧记录", evict_count);
        }

        entries.insert(
            key,
            FacetEntry {
                social_model,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
