use chrono::NaiveDateTime;

/// Default channel language.
pub const DEFAULT_LANGUAGE: &str = "zh-CN";

/// Default `<generator>` value for every rendered channel.
pub const DEFAULT_GENERATOR: &str = "TrendRadar RSS Generator";

/// A single news entry destined for a feed.
///
/// `guid` is expected to come from [`crate::storage::guid_for`] so that two
/// items with the same title, link and timestamp share an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub title: String,
    /// May be empty when the upstream source had no URL.
    pub link: String,
    pub description: String,
    pub pub_date: NaiveDateTime,
    pub guid: String,
    pub source_id: Option<String>,
    pub source_name: Option<String>,
    pub rank: Option<u32>,
    pub mobile_link: Option<String>,
    pub keywords: Vec<String>,
}

impl Item {
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        description: impl Into<String>,
        pub_date: NaiveDateTime,
        guid: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            description: description.into(),
            pub_date,
            guid: guid.into(),
            source_id: None,
            source_name: None,
            rank: None,
            mobile_link: None,
            keywords: Vec::new(),
        }
    }

    pub fn with_source(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.source_id = Some(id.into());
        self.source_name = Some(name.into());
        self
    }

    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn with_mobile_link(mut self, link: impl Into<String>) -> Self {
        self.mobile_link = Some(link.into());
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Exact, case-sensitive tag match.
    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k == keyword)
    }
}

/// An ordered collection of items plus channel metadata.
///
/// Built per generation request and dropped once rendered. The feed does not
/// enforce guid uniqueness; dedup lives in the store helpers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: NaiveDateTime,
    pub language: String,
    pub generator: String,
    pub last_build_date: NaiveDateTime,
    pub items: Vec<Item>,
}

impl Feed {
    /// Creates an empty feed. `last_build_date` starts equal to `pub_date`.
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        description: impl Into<String>,
        pub_date: NaiveDateTime,
    ) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            description: description.into(),
            pub_date,
            language: DEFAULT_LANGUAGE.to_string(),
            generator: DEFAULT_GENERATOR.to_string(),
            last_build_date: pub_date,
            items: Vec::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_generator(mut self, generator: impl Into<String>) -> Self {
        self.generator = generator.into();
        self
    }

    pub fn with_last_build_date(mut self, last_build_date: NaiveDateTime) -> Self {
        self.last_build_date = last_build_date;
        self
    }

    pub fn add_item(&mut self, item: Item) {
        self.items.push(item);
    }

    /// Items tagged with `keyword`, in feed order.
    pub fn items_by_keyword(&self, keyword: &str) -> Vec<&Item> {
        self.items
            .iter()
            .filter(|item| item.has_keyword(keyword))
            .collect()
    }

    /// Stable sort by publication date. Ties keep their relative order in
    /// both directions.
    pub fn sort_by_date(&mut self, descending: bool) {
        if descending {
            self.items.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
        } else {
            self.items.sort_by(|a, b| a.pub_date.cmp(&b.pub_date));
        }
    }

    /// Keeps the first `n` items in their current order.
    pub fn limit(&mut self, n: usize) {
        self.items.truncate(n);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 12, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn item(title: &str, when: NaiveDateTime, keywords: &[&str]) -> Item {
        Item::new(title, "", "", when, format!("guid-{title}"))
            .with_keywords(keywords.iter().copied())
    }

    fn titles(feed: &Feed) -> Vec<&str> {
        feed.items.iter().map(|i| i.title.as_str()).collect()
    }

    #[test]
    fn test_item_defaults() {
        let item = Item::new("t", "https://example.com", "d", ts(25, 10), "g");
        assert!(item.source_id.is_none());
        assert!(item.source_name.is_none());
        assert!(item.rank.is_none());
        assert!(item.mobile_link.is_none());
        assert!(item.keywords.is_empty());
    }

    #[test]
    fn test_item_optional_fields() {
        let item = Item::new("t", "https://example.com", "d", ts(25, 10), "g")
            .with_source("weibo", "微博")
            .with_rank(3)
            .with_mobile_link("https://m.example.com")
            .with_keywords(["AI", "芯片"]);
        assert_eq!(item.source_id.as_deref(), Some("weibo"));
        assert_eq!(item.source_name.as_deref(), Some("微博"));
        assert_eq!(item.rank, Some(3));
        assert_eq!(item.mobile_link.as_deref(), Some("https://m.example.com"));
        assert_eq!(item.keywords, vec!["AI", "芯片"]);
    }

    #[test]
    fn test_feed_defaults() {
        let feed = Feed::new("T", "https://example.com", "D", ts(25, 10));
        assert_eq!(feed.language, "zh-CN");
        assert_eq!(feed.generator, "TrendRadar RSS Generator");
        assert_eq!(feed.last_build_date, feed.pub_date);
        assert!(feed.is_empty());
    }

    #[test]
    fn test_explicit_last_build_date_kept() {
        let feed = Feed::new("T", "", "", ts(25, 10)).with_last_build_date(ts(26, 8));
        assert_eq!(feed.last_build_date, ts(26, 8));
        assert_eq!(feed.pub_date, ts(25, 10));
    }

    #[test]
    fn test_add_item_appends_in_order() {
        let mut feed = Feed::new("T", "", "", ts(25, 10));
        feed.add_item(item("a", ts(25, 1), &[]));
        feed.add_item(item("b", ts(25, 2), &[]));
        assert_eq!(titles(&feed), vec!["a", "b"]);
    }

    #[test]
    fn test_items_by_keyword_exact_match() {
        let mut feed = Feed::new("T", "", "", ts(25, 10));
        feed.add_item(item("a", ts(25, 1), &["AI"]));
        feed.add_item(item("b", ts(25, 2), &["ai"]));
        feed.add_item(item("c", ts(25, 3), &["AI", "x"]));
        feed.add_item(item("d", ts(25, 4), &[" AI"]));

        let matched: Vec<&str> = feed
            .items_by_keyword("AI")
            .into_iter()
            .map(|i| i.title.as_str())
            .collect();
        assert_eq!(matched, vec!["a", "c"]);
        assert!(feed.items_by_keyword("missing").is_empty());
    }

    #[test]
    fn test_sort_by_date_both_directions() {
        let mut feed = Feed::new("T", "", "", ts(25, 10));
        feed.add_item(item("mid", ts(25, 2), &[]));
        feed.add_item(item("old", ts(25, 1), &[]));
        feed.add_item(item("new", ts(25, 3), &[]));

        feed.sort_by_date(true);
        assert_eq!(titles(&feed), vec!["new", "mid", "old"]);

        feed.sort_by_date(false);
        assert_eq!(titles(&feed), vec!["old", "mid", "new"]);
    }

    #[test]
    fn test_sort_by_date_is_stable_for_ties() {
        let mut feed = Feed::new("T", "", "", ts(25, 10));
        feed.add_item(item("first", ts(25, 1), &[]));
        feed.add_item(item("second", ts(25, 1), &[]));
        feed.add_item(item("later", ts(25, 5), &[]));
        feed.add_item(item("third", ts(25, 1), &[]));

        feed.sort_by_date(true);
        assert_eq!(titles(&feed), vec!["later", "first", "second", "third"]);

        feed.sort_by_date(false);
        assert_eq!(titles(&feed), vec!["first", "second", "third", "later"]);
    }

    #[test]
    fn test_limit() {
        let mut feed = Feed::new("T", "", "", ts(25, 10));
        for n in 0..5 {
            feed.add_item(item(&n.to_string(), ts(25, n), &[]));
        }

        feed.limit(10);
        assert_eq!(feed.len(), 5);

        feed.limit(3);
        assert_eq!(titles(&feed), vec!["0", "1", "2"]);

        feed.limit(0);
        assert!(feed.is_empty());
    }

    proptest! {
        #[test]
        fn prop_limit_length(count in 0usize..40, n in 0usize..60) {
            let mut feed = Feed::new("T", "", "", ts(1, 0));
            for i in 0..count {
                feed.add_item(item(&i.to_string(), ts(1, 0), &[]));
            }
            feed.limit(n);
            prop_assert_eq!(feed.len(), n.min(count));
        }

        #[test]
        fn prop_sort_round_trip_is_ascending(hours in proptest::collection::vec(0u32..24, 0..30)) {
            let mut feed = Feed::new("T", "", "", ts(1, 0));
            for (i, h) in hours.iter().enumerate() {
                feed.add_item(item(&i.to_string(), ts(2, *h), &[]));
            }
            feed.sort_by_date(true);
            feed.sort_by_date(false);
            let dates: Vec<_> = feed.items.iter().map(|i| i.pub_date).collect();
            let mut sorted = dates.clone();
            sorted.sort();
            prop_assert_eq!(dates, sorted);
        }
    }
}
