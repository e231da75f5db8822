use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{NaiveDateTime, Timelike};
use md5::{Digest, Md5};

use super::atomic::write_atomic;
use super::types::{FileEntry, StoreError};
use crate::feed::{self, Feed, Item};

/// Reserved keyword for the unfiltered union of a feed.
pub const ALL_KEYWORD: &str = "all";

const FEED_EXTENSION: &str = "xml";
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// ISO-8601 without offset. Fractional seconds are six-digit microseconds
/// and are left out entirely when the microsecond part is zero.
pub(crate) fn iso8601(ts: NaiveDateTime) -> String {
    if ts.nanosecond() / 1_000 == 0 {
        ts.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

/// Stable 128-bit content id for an item, as 32 lowercase hex characters.
///
/// MD5 of `title + link + ISO-8601(pub_date)`. Identical inputs always
/// collide; this is an identity for dedup, not a security boundary.
pub fn guid_for(title: &str, link: &str, pub_date: NaiveDateTime) -> String {
    let input = format!("{}{}{}", title, link, iso8601(pub_date));
    Md5::digest(input.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// One-file-per-keyword RSS store rooted at a base directory.
///
/// Every save replaces the whole `{keyword}.xml` file; nothing is merged with
/// what was there before. There is no locking: concurrent writers to the same
/// keyword race and the last rename wins.
#[derive(Debug, Clone)]
pub struct FeedStore {
    base_dir: PathBuf,
}

impl FeedStore {
    /// Opens a store, creating `base_dir` and its parents if needed.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir).map_err(|source| StoreError::CreateDir {
            path: base_dir.clone(),
            source,
        })?;
        tracing::debug!(path = %base_dir.display(), "Opened feed store");
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `{base_dir}/{keyword}.xml`. The keyword is used verbatim, so callers
    /// must keep path separators out of it.
    pub fn path_for(&self, keyword: &str) -> PathBuf {
        self.base_dir.join(format!("{}.{}", keyword, FEED_EXTENSION))
    }

    /// Renders every item of `feed` and overwrites `{keyword}.xml`.
    pub fn save(&self, feed: &Feed, keyword: &str) -> Result<PathBuf, StoreError> {
        let xml = feed::render(feed)?;
        self.write(keyword, &xml, feed.len())
    }

    /// Renders only the items tagged `keyword` and overwrites `{keyword}.xml`.
    pub fn save_filtered(&self, feed: &Feed, keyword: &str) -> Result<PathBuf, StoreError> {
        let view = feed::filtered_view(feed, keyword);
        let xml = feed::render(&view)?;
        self.write(keyword, &xml, view.len())
    }

    /// Writes one filtered file per distinct keyword tag, then the full feed
    /// under [`ALL_KEYWORD`].
    pub fn save_all_keywords(&self, feed: &Feed) -> Result<BTreeMap<String, PathBuf>, StoreError> {
        let keywords: BTreeSet<&str> = feed
            .items
            .iter()
            .flat_map(|item| item.keywords.iter().map(String::as_str))
            .collect();

        let mut saved = BTreeMap::new();
        for keyword in keywords {
            let path = self.save_filtered(feed, keyword)?;
            saved.insert(keyword.to_string(), path);
        }

        let path = self.save(feed, ALL_KEYWORD)?;
        saved.insert(ALL_KEYWORD.to_string(), path);

        tracing::info!(files = saved.len(), items = feed.len(), "Saved keyword feeds");
        Ok(saved)
    }

    /// Contents of `{keyword}.xml`, or `None` if missing or unreadable.
    pub fn read(&self, keyword: &str) -> Option<String> {
        let path = self.path_for(keyword);
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(keyword, "No feed file for keyword");
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read feed file");
                None
            }
        }
    }

    /// Stems of the `.xml` files directly inside the base directory.
    ///
    /// Order follows the directory listing and is not meaningful.
    pub fn list_keywords(&self) -> Vec<String> {
        match self.feed_files() {
            Ok(files) => files
                .iter()
                .filter_map(|path| path.file_stem().and_then(|s| s.to_str()))
                .map(str::to_string)
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list feed keywords");
                Vec::new()
            }
        }
    }

    /// Deletes `.xml` files last modified strictly before `now - days`.
    ///
    /// Returns the number of files removed.
    pub fn purge_older_than(&self, days: u64) -> Result<usize, StoreError> {
        let retention = Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY));
        let Some(cutoff) = SystemTime::now().checked_sub(retention) else {
            return Ok(0);
        };

        let mut deleted = 0;
        for path in self.feed_files()? {
            let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping file with unreadable mtime");
                    continue;
                }
            };
            if modified < cutoff {
                std::fs::remove_file(&path).map_err(|source| StoreError::Delete {
                    path: path.clone(),
                    source,
                })?;
                tracing::debug!(path = %path.display(), "Deleted expired feed file");
                deleted += 1;
            }
        }

        tracing::info!(deleted, days, "Purged old feed files");
        Ok(deleted)
    }

    /// At most one entry: the current file for `keyword`.
    pub fn history_for(&self, keyword: &str) -> Vec<FileEntry> {
        let path = self.path_for(keyword);
        let metadata = match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Vec::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to stat feed file");
                return Vec::new();
            }
        };

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        vec![FileEntry {
            name,
            path,
            size: metadata.len(),
            modified,
        }]
    }

    pub fn is_duplicate(item: &Item, existing_guids: &HashSet<String>) -> bool {
        existing_guids.contains(&item.guid)
    }

    /// Appends `item` to `feed`.
    ///
    /// The duplicate check result is not applied: the item is always appended
    /// and the return value is always `true`. Callers that need dedup should
    /// gate on [`FeedStore::is_duplicate`] themselves.
    pub fn append_unique(feed: &mut Feed, item: Item, existing_guids: &HashSet<String>) -> bool {
        if Self::is_duplicate(&item, existing_guids) {
            tracing::debug!(guid = %item.guid, "Appending item with a known guid");
        }
        feed.add_item(item);
        true
    }

    fn write(&self, keyword: &str, xml: &str, items: usize) -> Result<PathBuf, StoreError> {
        let path = self.path_for(keyword);
        write_atomic(&path, xml.as_bytes()).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(keyword, items, path = %path.display(), "Wrote feed file");
        Ok(path)
    }

    fn feed_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let entries = std::fs::read_dir(&self.base_dir).map_err(|source| StoreError::Scan {
            path: self.base_dir.clone(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file && path.extension().is_some_and(|ext| ext == FEED_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::fs::File;

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 12, 25)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn setup() -> (tempfile::TempDir, FeedStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FeedStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn test_feed() -> Feed {
        Feed::new("测试Feed", "https://example.com/feed", "测试Feed描述", ts(10))
    }

    fn tagged(title: &str, keywords: &[&str]) -> Item {
        Item::new(
            title,
            "https://example.com",
            "desc",
            ts(9),
            guid_for(title, "https://example.com", ts(9)),
        )
        .with_keywords(keywords.iter().copied())
    }

    fn age_file(path: &Path, days: u64) {
        let when = SystemTime::now() - Duration::from_secs(days * SECONDS_PER_DAY);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(when)
            .unwrap();
    }

    #[test]
    fn test_open_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("output").join("rss");

        let store = FeedStore::open(&base).unwrap();

        assert!(base.is_dir());
        assert_eq!(store.base_dir(), base.as_path());
    }

    #[test]
    fn test_path_for() {
        let (dir, store) = setup();
        assert_eq!(store.path_for("test"), dir.path().join("test.xml"));
        assert_eq!(store.path_for("人工智能"), dir.path().join("人工智能.xml"));
    }

    #[test]
    fn test_guid_for_shape_and_purity() {
        let guid = guid_for("测试标题", "https://example.com", ts(10));
        assert_eq!(guid.len(), 32);
        assert!(guid.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(guid, guid_for("测试标题", "https://example.com", ts(10)));
    }

    #[test]
    fn test_guid_for_known_value() {
        let when = NaiveDate::from_ymd_opt(2023, 12, 25)
            .unwrap()
            .and_hms_opt(10, 30, 45)
            .unwrap();
        assert_eq!(guid_for("T1", "u", when), "5aac6575e546b84023b9c08921db9eaf");
    }

    #[test]
    fn test_iso8601_fraction() {
        let date = NaiveDate::from_ymd_opt(2023, 12, 25).unwrap();
        let whole = date.and_hms_opt(10, 30, 45).unwrap();
        let nanos = date.and_hms_nano_opt(10, 30, 45, 123_456_789).unwrap();
        let micros = date.and_hms_micro_opt(10, 30, 45, 500).unwrap();
        let sub_micro = date.and_hms_nano_opt(10, 30, 45, 999).unwrap();

        assert_eq!(iso8601(whole), "2023-12-25T10:30:45");
        assert_eq!(iso8601(nanos), "2023-12-25T10:30:45.123456");
        assert_eq!(iso8601(micros), "2023-12-25T10:30:45.000500");
        assert_eq!(iso8601(sub_micro), "2023-12-25T10:30:45");
    }

    #[test]
    fn test_guid_for_each_input_matters() {
        let base = guid_for("t", "l", ts(10));
        assert_ne!(base, guid_for("t2", "l", ts(10)));
        assert_ne!(base, guid_for("t", "l2", ts(10)));
        assert_ne!(base, guid_for("t", "l", ts(11)));
    }

    #[test]
    fn test_save_writes_full_feed() {
        let (_dir, store) = setup();
        let mut feed = test_feed();
        feed.add_item(tagged("untagged", &[]));

        let path = store.save(&feed, "test").unwrap();

        assert!(path.ends_with("test.xml"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(r#"<rss version="2.0">"#));
        assert!(content.contains("<title>测试Feed</title>"));
        assert!(content.contains("<title>untagged</title>"));
    }

    #[test]
    fn test_save_overwrites_previous_content() {
        let (_dir, store) = setup();
        let mut first = test_feed();
        first.add_item(tagged("old news", &["k"]));
        store.save_filtered(&first, "k").unwrap();

        let mut second = test_feed();
        second.add_item(tagged("new news", &["k"]));
        store.save_filtered(&second, "k").unwrap();

        let content = store.read("k").unwrap();
        assert!(content.contains("new news"));
        assert!(!content.contains("old news"));
    }

    #[test]
    fn test_save_filtered_only_keeps_tagged_items() {
        let (_dir, store) = setup();
        let mut feed = test_feed();
        feed.add_item(tagged("match", &["test"]));
        feed.add_item(tagged("other", &["else"]));

        let path = store.save_filtered(&feed, "test").unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("<title>测试Feed - test</title>"));
        assert!(content.contains("<title>match</title>"));
        assert!(!content.contains("<title>other</title>"));
    }

    #[test]
    fn test_save_all_keywords() {
        let (_dir, store) = setup();
        let mut feed = test_feed();
        feed.add_item(tagged("X news", &["x"]));
        feed.add_item(tagged("Y news", &["y"]));

        let saved = store.save_all_keywords(&feed).unwrap();

        let keys: Vec<&str> = saved.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["all", "x", "y"]);

        let x = store.read("x").unwrap();
        assert!(x.contains("X news"));
        assert!(!x.contains("Y news"));

        let all = store.read("all").unwrap();
        assert!(all.contains("X news"));
        assert!(all.contains("Y news"));
        assert_eq!(saved["all"], store.path_for("all"));
    }

    #[test]
    fn test_save_all_keywords_empty_feed_writes_only_all() {
        let (_dir, store) = setup();

        let saved = store.save_all_keywords(&test_feed()).unwrap();

        assert_eq!(saved.len(), 1);
        assert!(saved.contains_key(ALL_KEYWORD));
    }

    #[test]
    fn test_save_into_removed_directory_propagates_error() {
        let (dir, store) = setup();
        std::fs::remove_dir_all(dir.path()).unwrap();

        let result = store.save(&test_feed(), "gone");

        assert!(matches!(result, Err(StoreError::Write { .. })));
    }

    #[test]
    fn test_read_missing_returns_none() {
        let (_dir, store) = setup();
        assert!(store.read("missing").is_none());
    }

    #[test]
    fn test_read_failure_degrades_to_none() {
        let (dir, store) = setup();
        // A directory where the file should be makes read_to_string fail
        std::fs::create_dir(dir.path().join("broken.xml")).unwrap();

        assert!(store.read("broken").is_none());
    }

    #[test]
    fn test_read_round_trip() {
        let (_dir, store) = setup();
        let path = store.save(&test_feed(), "test").unwrap();

        let content = store.read("test").unwrap();
        assert_eq!(content, std::fs::read_to_string(path).unwrap());
    }

    #[test]
    fn test_list_keywords() {
        let (dir, store) = setup();
        store.save(&test_feed(), "a").unwrap();
        store.save(&test_feed(), "b").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("nested.xml")).unwrap();
        std::fs::write(dir.path().join("nested.xml").join("c.xml"), "x").unwrap();

        let mut keywords = store.list_keywords();
        keywords.sort();

        assert_eq!(keywords, vec!["a", "b"]);
    }

    #[test]
    fn test_list_keywords_empty() {
        let (_dir, store) = setup();
        assert!(store.list_keywords().is_empty());
    }

    #[test]
    fn test_purge_older_than() {
        let (_dir, store) = setup();
        let old = store.save(&test_feed(), "old").unwrap();
        let recent = store.save(&test_feed(), "recent").unwrap();
        age_file(&old, 31);
        age_file(&recent, 29);

        let deleted = store.purge_older_than(30).unwrap();

        assert_eq!(deleted, 1);
        assert!(!old.exists());
        assert!(recent.exists());
    }

    #[test]
    fn test_purge_ignores_non_xml_files() {
        let (dir, store) = setup();
        let other = dir.path().join("keep.txt");
        std::fs::write(&other, "x").unwrap();
        age_file(&other, 100);

        assert_eq!(store.purge_older_than(30).unwrap(), 0);
        assert!(other.exists());
    }

    #[test]
    fn test_history_for() {
        let (_dir, store) = setup();
        let path = store.save(&test_feed(), "test").unwrap();

        let history = store.history_for("test");

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].name, "test.xml");
        assert_eq!(history[0].path, path);
        assert_eq!(history[0].size, std::fs::metadata(&path).unwrap().len());
        assert!(store.history_for("not_exists").is_empty());
    }

    #[test]
    fn test_is_duplicate() {
        let item = Item::new("t", "l", "d", ts(1), "test-guid");
        let mut guids = HashSet::new();
        assert!(!FeedStore::is_duplicate(&item, &guids));

        guids.insert("test-guid".to_string());
        assert!(FeedStore::is_duplicate(&item, &guids));
    }

    #[test]
    fn test_append_unique_always_appends() {
        // Known quirk: the duplicate check does not gate the append.
        let mut feed = test_feed();
        let item = Item::new("t", "l", "d", ts(1), "test-guid");
        let guids: HashSet<String> = ["test-guid".to_string()].into_iter().collect();

        assert!(FeedStore::append_unique(&mut feed, item.clone(), &HashSet::new()));
        assert!(FeedStore::append_unique(&mut feed, item.clone(), &guids));

        assert_eq!(feed.len(), 2);
        assert_eq!(feed.items[0], item);
        assert_eq!(feed.items[1], item);
    }

    proptest! {
        #[test]
        fn prop_guid_changes_with_title(a in ".{0,20}", b in ".{0,20}") {
            prop_assume!(a != b);
            prop_assert_ne!(guid_for(&a, "l", ts(1)), guid_for(&b, "l", ts(1)));
        }
    }
}
