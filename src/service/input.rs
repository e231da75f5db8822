//! Shapes of the aggregation data handed to the service.
//!
//! Both shapes arrive as JSON from the upstream pipeline. Missing or `null`
//! string fields are read as empty strings. Groups, sources and titles keep
//! the order they had in the JSON document.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

/// Source id → display name.
pub type IdToName = HashMap<String, String>;

/// Group keyword → matched headlines.
pub type FrequencyResults = IndexMap<String, Vec<FrequencyEntry>>;

/// Source id → raw title → rank information.
pub type RawResults = IndexMap<String, IndexMap<String, RawEntry>>;

/// One headline matched under a keyword group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FrequencyEntry {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(rename = "mobileUrl", deserialize_with = "null_as_default")]
    pub mobile_url: String,
    /// Source platform id.
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    pub rank: u32,
    /// How many times the headline was seen across crawls.
    pub count: u32,
}

/// A raw crawl entry: either a descriptor object or just the rank list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawEntry {
    BareRankList(Vec<u32>),
    Ranked(RankedDescriptor),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RankedDescriptor {
    pub ranks: Vec<u32>,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(rename = "mobileUrl", deserialize_with = "null_as_default")]
    pub mobile_url: String,
}

/// A raw entry resolved to the fields the feed builder needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NormalizedEntry<'a> {
    pub rank: u32,
    pub url: &'a str,
    pub mobile_url: &'a str,
}

impl RawEntry {
    /// Rank is the first recorded rank, or 1 when none were recorded.
    pub(crate) fn normalize(&self) -> NormalizedEntry<'_> {
        let (ranks, url, mobile_url) = match self {
            RawEntry::BareRankList(ranks) => (ranks.as_slice(), "", ""),
            RawEntry::Ranked(d) => (d.ranks.as_slice(), d.url.as_str(), d.mobile_url.as_str()),
        };
        NormalizedEntry {
            rank: ranks.first().copied().unwrap_or(1),
            url,
            mobile_url,
        }
    }
}

/// Input to [`super::FeedService::generate_and_persist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrendInput {
    /// Keyword-grouped results; every group gets its own file.
    Frequency(FrequencyResults),
    /// Unfiltered crawl results; only `all.xml` is written.
    Raw(RawResults),
}

impl TrendInput {
    pub fn from_json(json: &str, raw: bool) -> Result<Self, serde_json::Error> {
        if raw {
            serde_json::from_str(json).map(TrendInput::Raw)
        } else {
            serde_json::from_str(json).map(TrendInput::Frequency)
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
