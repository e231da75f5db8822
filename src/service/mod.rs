pub mod feed_service;
pub mod input;

pub use feed_service::{
    CleanupReport, FeedService, HistoryEntry, Statistics, Subscription, DEFAULT_BASE_URL,
};
pub use input::{
    FrequencyEntry, FrequencyResults, IdToName, RankedDescriptor, RawEntry, RawResults,
    TrendInput,
};
