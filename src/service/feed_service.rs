use std::collections::BTreeMap;
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;

use super::input::{FrequencyResults, IdToName, RawResults, TrendInput};
use crate::feed::{self, Feed, Item};
use crate::storage::{guid_for, iso8601, FeedStore, StoreError, ALL_KEYWORD};

pub const DEFAULT_BASE_URL: &str = "https://trendradar.example.com";

const FEED_TITLE: &str = "TrendRadar热点分析";
const FEED_DESCRIPTION: &str = "TrendRadar智能新闻聚合和监控系统生成的RSS Feed";
const RAW_FEED_DESCRIPTION: &str = "TrendRadar智能新闻聚合和监控系统生成的RSS Feed（包含全部内容）";

/// Descriptor for one keyword feed available to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub keyword: String,
    pub title: String,
    pub link: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub filename: String,
    pub path: String,
    pub size: u64,
    /// ISO-8601 local time.
    pub modified_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_subscriptions: usize,
    /// Sum of file sizes in bytes.
    pub total_size: u64,
    pub available_keywords: Vec<String>,
    /// Time of the call, not of any file.
    pub last_update: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub deleted_count: usize,
    pub cleanup_time: String,
    pub retention_days: u64,
}

/// Builds feeds from aggregation results and answers read-side queries over
/// the store.
///
/// Keywords are taken as given; rejecting empty ones is the caller's job.
#[derive(Debug, Clone)]
pub struct FeedService {
    store: FeedStore,
    base_url: String,
    max_items: usize,
}

impl FeedService {
    pub fn new(store: FeedStore, base_url: impl Into<String>) -> Self {
        Self {
            store,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_items: 0,
        }
    }

    /// Caps the number of items persisted per generation. 0 = unlimited.
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One item per matched headline, tagged with its group keyword.
    pub fn build_from_frequency_results(
        &self,
        results: &FrequencyResults,
        id_to_name: &IdToName,
    ) -> Feed {
        let now = now();
        let mut feed = Feed::new(FEED_TITLE, self.base_url.as_str(), FEED_DESCRIPTION, now);

        for (group, entries) in results {
            for entry in entries {
                let source_name = resolve_name(id_to_name, &entry.id);

                let mut description = format!("来源: {} | 排名: {}", source_name, entry.rank);
                if entry.count > 1 {
                    description.push_str(&format!(" | 出现次数: {}", entry.count));
                }

                let guid = guid_for(&entry.title, &entry.url, now);
                let item = Item::new(entry.title.as_str(), entry.url.as_str(), description, now, guid)
                    .with_source(entry.id.as_str(), source_name)
                    .with_rank(entry.rank)
                    .with_keywords([group.as_str()]);
                feed.add_item(with_mobile(item, &entry.mobile_url));
            }
        }

        feed.sort_by_date(true);
        tracing::debug!(groups = results.len(), items = feed.len(), "Built feed from frequency results");
        feed
    }

    /// One item per crawled title, all tagged [`ALL_KEYWORD`].
    pub fn build_from_raw_results(&self, results: &RawResults, id_to_name: &IdToName) -> Feed {
        let now = now();
        let mut feed = Feed::new(FEED_TITLE, self.base_url.as_str(), RAW_FEED_DESCRIPTION, now);

        for (source_id, titles) in results {
            let source_name = resolve_name(id_to_name, source_id);

            for (title, raw) in titles {
                let entry = raw.normalize();
                let description = format!("来源: {} | 排名: {}", source_name, entry.rank);
                let guid = guid_for(title, entry.url, now);

                let item = Item::new(title.as_str(), entry.url, description, now, guid)
                    .with_source(source_id.as_str(), source_name)
                    .with_rank(entry.rank)
                    .with_keywords([ALL_KEYWORD]);
                feed.add_item(with_mobile(item, entry.mobile_url));
            }
        }

        feed.sort_by_date(true);
        tracing::debug!(sources = results.len(), items = feed.len(), "Built feed from raw results");
        feed
    }

    /// Builds a feed from `input` and writes it out.
    ///
    /// Raw input is written to `all.xml` only; frequency input gets one file
    /// per keyword plus `all.xml`. Returns keyword → file path.
    pub fn generate_and_persist(
        &self,
        input: &TrendInput,
        id_to_name: &IdToName,
    ) -> Result<BTreeMap<String, String>, StoreError> {
        let saved = match input {
            TrendInput::Raw(results) => {
                let feed = self.capped(self.build_from_raw_results(results, id_to_name));
                let path = self.store.save(&feed, ALL_KEYWORD)?;
                BTreeMap::from([(ALL_KEYWORD.to_string(), path)])
            }
            TrendInput::Frequency(results) => {
                let feed = self.capped(self.build_from_frequency_results(results, id_to_name));
                self.store.save_all_keywords(&feed)?
            }
        };

        Ok(saved
            .into_iter()
            .map(|(keyword, path)| (keyword, path.display().to_string()))
            .collect())
    }

    pub fn list_subscriptions(&self) -> Vec<Subscription> {
        self.store
            .list_keywords()
            .into_iter()
            .map(|keyword| Subscription {
                title: format!("TrendRadar - {}", keyword),
                link: format!("{}/rss/{}.xml", self.base_url, keyword),
                description: format!("{} - {}相关内容", FEED_TITLE, keyword),
                keyword,
            })
            .collect()
    }

    pub fn content_for(&self, keyword: &str) -> Option<String> {
        self.store.read(keyword)
    }

    pub fn history_for(&self, keyword: &str) -> Vec<HistoryEntry> {
        self.store
            .history_for(keyword)
            .into_iter()
            .map(|entry| HistoryEntry {
                filename: entry.name,
                path: entry.path.display().to_string(),
                size: entry.size,
                modified_time: iso8601(local_time(entry.modified)),
            })
            .collect()
    }

    pub fn statistics(&self) -> Statistics {
        let keywords = self.store.list_keywords();
        let total_size = keywords
            .iter()
            .filter_map(|k| std::fs::metadata(self.store.path_for(k)).ok())
            .map(|m| m.len())
            .sum();

        Statistics {
            total_subscriptions: keywords.len(),
            total_size,
            available_keywords: keywords,
            last_update: iso8601(now()),
        }
    }

    pub fn cleanup(&self, days: u64) -> Result<CleanupReport, StoreError> {
        let deleted_count = self.store.purge_older_than(days)?;
        Ok(CleanupReport {
            deleted_count,
            cleanup_time: iso8601(now()),
            retention_days: days,
        })
    }

    pub fn is_valid(&self, xml: &str) -> bool {
        feed::is_well_formed(xml)
    }

    fn capped(&self, mut feed: Feed) -> Feed {
        if self.max_items > 0 {
            feed.limit(self.max_items);
        }
        feed
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn local_time(time: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}

/// Display name for a source, falling back to the id itself.
fn resolve_name<'a>(id_to_name: &'a IdToName, id: &'a str) -> &'a str {
    id_to_name.get(id).map(String::as_str).unwrap_or(id)
}

fn with_mobile(item: Item, mobile_url: &str) -> Item {
    if mobile_url.is_empty() {
        item
    } else {
        item.with_mobile_link(mobile_url)
    }
}
