//! RSS 2.0 rendering.
//!
//! Everything here is pure: a [`Feed`] goes in, XML text comes out. Items are
//! written in the feed's current order; sorting is the caller's job.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use chrono::NaiveDateTime;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

use super::model::{Feed, Item};

const RSS_VERSION: &str = "2.0";

/// Prefix for the `<source url="...">` attribute; the source id is appended.
pub const SOURCE_BASE_URL: &str = "https://trendradar.example.com";

/// Errors that can occur while rendering a feed.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The XML writer rejected an event.
    #[error("Failed to write RSS XML: {0}")]
    Write(#[from] std::io::Error),

    /// Rendered bytes were not valid UTF-8.
    #[error("Generated RSS contains invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Formats a timestamp as `Mon, 25 Dec 2023 10:30:45 GMT`.
///
/// No timezone conversion happens here: the literal `GMT` suffix is appended
/// to whatever wall-clock value the caller supplies.
pub fn format_date(ts: NaiveDateTime) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Escapes the five XML-significant characters to their named entities.
///
/// Characters XML 1.0 cannot carry at all (most C0 controls, U+FFFE, U+FFFF)
/// are dropped first. Not idempotent: `&amp;` becomes `&amp;amp;`. Pass raw
/// text exactly once.
pub fn escape_text(s: &str) -> String {
    quick_xml::escape::escape(strip_invalid_chars(s)).into_owned()
}

/// Removes every character outside the XML 1.0 `Char` production.
fn strip_invalid_chars(s: &str) -> Cow<'_, str> {
    if s.chars().all(is_xml_char) {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(s.chars().filter(|c| is_xml_char(*c)).collect())
    }
}

fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\u{9}' | '\u{A}' | '\u{D}'
            | '\u{20}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}

fn check_chars(text: &str) -> Result<(), String> {
    match text.chars().find(|c| !is_xml_char(*c)) {
        Some(c) => Err(format!("character U+{:04X} is not allowed in XML", c as u32)),
        None => Ok(()),
    }
}

/// Renders the whole feed as a pretty-printed RSS 2.0 document.
pub fn render(feed: &Feed) -> Result<String, RenderError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
    )?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", RSS_VERSION));
    emit(&mut writer, Event::Start(rss))?;
    emit(&mut writer, Event::Start(BytesStart::new("channel")))?;

    write_escaped(&mut writer, "title", &feed.title)?;
    write_plain(&mut writer, "link", &feed.link)?;
    write_escaped(&mut writer, "description", &feed.description)?;
    write_plain(&mut writer, "language", &feed.language)?;
    write_plain(&mut writer, "pubDate", &format_date(feed.pub_date))?;
    write_plain(
        &mut writer,
        "lastBuildDate",
        &format_date(feed.last_build_date),
    )?;
    write_plain(&mut writer, "generator", &feed.generator)?;

    for item in &feed.items {
        write_item(&mut writer, item)?;
    }

    emit(&mut writer, Event::End(BytesEnd::new("channel")))?;
    emit(&mut writer, Event::End(BytesEnd::new("rss")))?;

    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8(bytes)?)
}

/// Builds the keyword-scoped view of `feed` without touching the input.
///
/// Channel title, link and description are suffixed with the keyword and only
/// items tagged with it are kept.
pub fn filtered_view(feed: &Feed, keyword: &str) -> Feed {
    let mut view = Feed::new(
        format!("{} - {}", feed.title, keyword),
        format!("{}?keyword={}", feed.link, keyword),
        format!("{} - {}相关内容", feed.description, keyword),
        feed.pub_date,
    )
    .with_language(feed.language.clone())
    .with_generator(feed.generator.clone())
    .with_last_build_date(feed.last_build_date);

    view.items = feed
        .items_by_keyword(keyword)
        .into_iter()
        .cloned()
        .collect();
    view
}

/// Renders only the items tagged with `keyword`.
pub fn render_filtered(feed: &Feed, keyword: &str) -> Result<String, RenderError> {
    render(&filtered_view(feed, keyword))
}

/// Renders several feeds keyed by title. Feeds sharing a title collide and
/// the last one wins.
pub fn render_many(feeds: &[Feed]) -> Result<BTreeMap<String, String>, RenderError> {
    let mut rendered = BTreeMap::new();
    for feed in feeds {
        rendered.insert(feed.title.clone(), render(feed)?);
    }
    Ok(rendered)
}

/// Returns true if `xml` parses as a well-formed XML document.
///
/// Syntax only: an RSS-shaped document is not required.
pub fn is_well_formed(xml: &str) -> bool {
    match check_well_formed(xml) {
        Ok(()) => true,
        Err(reason) => {
            tracing::debug!(reason = %reason, "XML is not well-formed");
            false
        }
    }
}

fn check_well_formed(xml: &str) -> Result<(), String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth: usize = 0;
    let mut seen_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                check_element(&e, &reader, depth, &mut seen_root)?;
                depth += 1;
            }
            Ok(Event::Empty(e)) => {
                check_element(&e, &reader, depth, &mut seen_root)?;
            }
            Ok(Event::End(_)) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "end tag without matching start".to_string())?;
            }
            Ok(Event::Text(t)) => {
                if depth == 0 {
                    return Err("text outside the root element".to_string());
                }
                check_chars(&t.unescape().map_err(|e| e.to_string())?)?;
            }
            Ok(Event::CData(_)) if depth == 0 => {
                return Err("CDATA outside the root element".to_string());
            }
            Ok(Event::CData(c)) => {
                check_chars(&String::from_utf8_lossy(&c))?;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            Ok(_) => {}
        }
    }

    if !seen_root {
        return Err("document has no root element".to_string());
    }
    if depth != 0 {
        return Err(format!("{depth} element(s) left unclosed"));
    }
    Ok(())
}

fn check_element(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
    depth: usize,
    seen_root: &mut bool,
) -> Result<(), String> {
    if depth == 0 {
        if *seen_root {
            return Err("content after the root element".to_string());
        }
        *seen_root = true;
    }
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| e.to_string())?;
        check_chars(&value)?;
    }
    Ok(())
}

fn write_item<W: Write>(writer: &mut Writer<W>, item: &Item) -> Result<(), RenderError> {
    emit(writer, Event::Start(BytesStart::new("item")))?;

    write_escaped(writer, "title", &item.title)?;
    write_plain(writer, "link", &item.link)?;
    write_escaped(writer, "description", &item.description)?;
    write_plain(writer, "pubDate", &format_date(item.pub_date))?;

    let mut guid = BytesStart::new("guid");
    guid.push_attribute(("isPermaLink", "false"));
    write_element(writer, guid, BytesText::new(&strip_invalid_chars(&item.guid)))?;

    if let (Some(id), Some(name)) = (non_empty(&item.source_id), non_empty(&item.source_name)) {
        let url = format!("{}/{}", SOURCE_BASE_URL, strip_invalid_chars(id));
        let mut source = BytesStart::new("source");
        source.push_attribute(("url", url.as_str()));
        let name = escape_text(name);
        write_element(writer, source, BytesText::from_escaped(name.as_str()))?;
    }

    // Rank 0 means "unranked" upstream and gets no category.
    if let Some(rank) = item.rank.filter(|r| *r > 0) {
        write_escaped(writer, "category", &format!("Rank: {}", rank))?;
    }
    for keyword in &item.keywords {
        write_escaped(writer, "category", keyword)?;
    }

    emit(writer, Event::End(BytesEnd::new("item")))
}

/// Free text: escaped once by [`escape_text`], then written verbatim.
fn write_escaped<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), RenderError> {
    let escaped = escape_text(text);
    write_element(
        writer,
        BytesStart::new(name),
        BytesText::from_escaped(escaped.as_str()),
    )
}

/// URLs, dates and identifiers: the writer escapes them itself.
fn write_plain<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> Result<(), RenderError> {
    let value = strip_invalid_chars(value);
    write_element(writer, BytesStart::new(name), BytesText::new(&value))
}

fn write_element<W: Write>(
    writer: &mut Writer<W>,
    start: BytesStart<'_>,
    text: BytesText<'_>,
) -> Result<(), RenderError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    emit(writer, Event::Start(start))?;
    emit(writer, Event::Text(text))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn emit<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<(), RenderError> {
    Ok(writer.write_event(event)?)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
