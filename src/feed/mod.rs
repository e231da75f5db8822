//! Feed data model and RSS 2.0 rendering.
//!
//! - [`model`] - [`Feed`] and [`Item`] records with filter/sort/limit helpers
//! - [`generator`] - pure XML rendering, escaping, date formatting and the
//!   well-formedness check
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use trendfeed::feed::{self, Feed};
//!
//! let now = NaiveDate::from_ymd_opt(2023, 12, 25).unwrap().and_hms_opt(10, 30, 45).unwrap();
//! let xml = feed::render(&Feed::new("T", "https://example.com", "D", now)).unwrap();
//! assert!(feed::is_well_formed(&xml));
//! ```

pub mod generator;
pub mod model;

pub use generator::{
    escape_text, filtered_view, format_date, is_well_formed, render, render_filtered,
    render_many, RenderError, SOURCE_BASE_URL,
};
pub use model::{Feed, Item, DEFAULT_GENERATOR, DEFAULT_LANGUAGE};
