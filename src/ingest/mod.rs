// src/ingest/mod.rs
pub mod detector;
pub mod feed;
pub mod monitor;
pub mod poller;

use once_cell::sync::OnceCell;
use regex::Regex;

pub use detector::{DealDetector, Detection};
pub use monitor::{FeedMonitor, FeedStatus, MonitorSettings};
pub use poller::{FeedFetcher, FeedPoller, FeedPollerState, FetchError, PollerSettings};

/// Normalize feed text: decode entities, strip markup, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode (feeds often double-escape their markup)
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z!][^>]*>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{00A0}', " ");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_markup_and_collapses_ws() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b></p>\n\n ";
        assert_eq!(normalize_text(s), "Hello, world");
    }

    #[test]
    fn escaped_markup_is_decoded_then_stripped() {
        let s = "&lt;a href=&quot;x&quot;&gt;Deal&lt;/a&gt; &amp; more";
        assert_eq!(normalize_text(s), "Deal & more");
    }

    #[test]
    fn price_comparisons_survive_tag_stripping() {
        assert_eq!(normalize_text("now < $100 and > $50"), "now < $100 and > $50");
    }
}
