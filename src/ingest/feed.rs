// src/ingest/feed.rs
//! Tolerant RSS 2.0 / Atom entry reader.
//!
//! Streams the document with quick-xml and collects `<item>` / `<entry>`
//! elements. A malformed document does not fail the whole read: entries
//! completed before the error are returned alongside the error text.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::normalize_text;

/// One feed entry with its fields as text. Missing fields are empty.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published: String,
    pub category: Option<String>,
}

#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub entries: Vec<FeedEntry>,
    /// Set when reading stopped early on malformed XML.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    Content,
    Published,
    Category,
}

fn field_for(name: &[u8]) -> Option<Field> {
    match name {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"description" | b"summary" => Some(Field::Description),
        b"content:encoded" | b"content" => Some(Field::Content),
        b"pubDate" | b"published" | b"updated" | b"dc:date" => Some(Field::Published),
        b"category" => Some(Field::Category),
        _ => None,
    }
}

fn is_entry(name: &[u8]) -> bool {
    name == b"item" || name == b"entry"
}

/// Working state for the entry being read.
#[derive(Default)]
struct Draft {
    entry: FeedEntry,
    content: String,
}

impl Draft {
    fn finish(mut self) -> FeedEntry {
        if self.entry.description.is_empty() {
            self.entry.description = self.content;
        }
        self.entry
    }

    /// Atom carries link targets and category terms in attributes.
    fn absorb_attributes(&mut self, field: Field, e: &BytesStart<'_>) {
        for attr in e.attributes().flatten() {
            let value = match attr.unescape_value() {
                Ok(v) => v.trim().to_string(),
                Err(_) => continue,
            };
            match (field, attr.key.as_ref()) {
                (Field::Link, b"href") if self.entry.link.is_empty() => {
                    if link_rel_is_alternate(e) {
                        self.entry.link = value;
                    }
                }
                (Field::Category, b"term") if self.entry.category.is_none() => {
                    if !value.is_empty() {
                        self.entry.category = Some(value);
                    }
                }
                _ => {}
            }
        }
    }

    fn commit(&mut self, field: Field, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let e = &mut self.entry;
        match field {
            Field::Title if e.title.is_empty() => e.title = normalize_text(text),
            Field::Link if e.link.is_empty() => e.link = text.to_string(),
            Field::Description if e.description.is_empty() => {
                e.description = normalize_text(text)
            }
            Field::Content if self.content.is_empty() => self.content = normalize_text(text),
            Field::Published if e.published.is_empty() => e.published = text.to_string(),
            Field::Category if e.category.is_none() => e.category = Some(normalize_text(text)),
            _ => {}
        }
    }
}

fn link_rel_is_alternate(e: &BytesStart<'_>) -> bool {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"rel")
        .map_or(true, |a| a.value.as_ref() == b"alternate")
}

fn push_text(buf: &mut String, text: &str) {
    if !buf.is_empty() {
        buf.push(' ');
    }
    buf.push_str(text);
}

/// Read every entry the document yields before EOF or the first XML error.
pub fn read_entries(xml: &str) -> ParsedFeed {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut out = ParsedFeed::default();
    let mut draft: Option<Draft> = None;
    // Element depth relative to the open entry; 1 = direct child.
    let mut depth: usize = 0;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                if draft.is_none() {
                    if is_entry(name.as_ref()) {
                        draft = Some(Draft::default());
                        depth = 0;
                        field = None;
                    }
                    continue;
                }
                depth += 1;
                if depth == 1 {
                    field = field_for(name.as_ref());
                    text.clear();
                    if let (Some(f), Some(d)) = (field, draft.as_mut()) {
                        d.absorb_attributes(f, &e);
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if depth == 0 {
                    if let (Some(f), Some(d)) = (field_for(e.name().as_ref()), draft.as_mut()) {
                        d.absorb_attributes(f, &e);
                    }
                }
            }
            Ok(Event::End(e)) => {
                let Some(d) = draft.as_mut() else { continue };
                if depth == 0 {
                    if is_entry(e.name().as_ref()) {
                        if let Some(done) = draft.take() {
                            out.entries.push(done.finish());
                        }
                    }
                    continue;
                }
                if depth == 1 {
                    if let Some(f) = field.take() {
                        d.commit(f, &text);
                    }
                    text.clear();
                }
                depth -= 1;
            }
            Ok(Event::Text(e)) => {
                if field.is_some() {
                    let t: Cow<'_, str> = match e.unescape() {
                        Ok(t) => t,
                        // Undeclared HTML entities such as &nbsp; are common in feeds.
                        Err(_) => Cow::Owned(
                            html_escape::decode_html_entities(&String::from_utf8_lossy(&e))
                                .into_owned(),
                        ),
                    };
                    push_text(&mut text, &t);
                }
            }
            Ok(Event::CData(e)) => {
                if field.is_some() {
                    push_text(&mut text, &String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                out.error = Some(format!(
                    "malformed XML at byte {}: {e}",
                    reader.buffer_position()
                ));
                break;
            }
            _ => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Deals</title>
    <item>
      <title>Cheap SSD &amp; more</title>
      <link>https://www.ozbargain.com.au/node/111111</link>
      <description><![CDATA[<p>1TB for <b>$59</b> (was $99)</p>]]></description>
      <pubDate>Sun, 19 Oct 2025 10:00:00 +1100</pubDate>
      <category>Computing</category>
      <category>Storage</category>
    </item>
    <item>
      <title>Headphones</title>
      <link>https://www.ozbargain.com.au/node/222222</link>
      <description>Only&nbsp;$89</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn reads_rss_items() {
        let parsed = read_entries(RSS);
        assert!(parsed.error.is_none(), "{:?}", parsed.error);
        assert_eq!(parsed.entries.len(), 2);

        let first = &parsed.entries[0];
        assert_eq!(first.title, "Cheap SSD & more");
        assert_eq!(first.link, "https://www.ozbargain.com.au/node/111111");
        assert_eq!(first.description, "1TB for $59 (was $99)");
        assert_eq!(first.published, "Sun, 19 Oct 2025 10:00:00 +1100");
        assert_eq!(first.category.as_deref(), Some("Computing"));

        let second = &parsed.entries[1];
        assert_eq!(second.description, "Only $89");
        assert!(second.published.is_empty());
        assert!(second.category.is_none());
    }

    #[test]
    fn reads_atom_entries() {
        let atom = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Deals</title>
  <link href="https://example.com/"/>
  <entry>
    <title>Console bundle</title>
    <link rel="replies" href="https://example.com/node/1#comments"/>
    <link href="https://example.com/node/1"/>
    <summary>Now $399</summary>
    <updated>2025-10-19T10:00:00Z</updated>
    <category term="Gaming"/>
  </entry>
</feed>"#;
        let parsed = read_entries(atom);
        assert_eq!(parsed.entries.len(), 1);
        let e = &parsed.entries[0];
        assert_eq!(e.link, "https://example.com/node/1");
        assert_eq!(e.description, "Now $399");
        assert_eq!(e.published, "2025-10-19T10:00:00Z");
        assert_eq!(e.category.as_deref(), Some("Gaming"));
    }

    #[test]
    fn malformed_tail_keeps_completed_entries() {
        let xml = r#"<rss><channel>
<item><title>A</title><link>https://x.test/a</link><description>d</description></item>
<item><title>B</title><link>https://x.test/b</wrong></item>"#;
        let parsed = read_entries(xml);
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].title, "A");
        assert!(parsed.error.is_some());
    }

    #[test]
    fn content_encoded_backs_up_missing_description() {
        let xml = r#"<rss><channel><item>
<title>T</title><link>https://x.test/t</link>
<content:encoded><![CDATA[<div>Body text</div>]]></content:encoded>
</item></channel></rss>"#;
        let parsed = read_entries(xml);
        assert_eq!(parsed.entries[0].description, "Body text");
    }
}
