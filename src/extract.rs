//! Token extraction from fetched feed pages.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Element;
use scraper::{ElementRef, Html, Selector};

static MESSAGE_WRAP: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".tgme_widget_message_wrap").expect("valid selector"));
static MESSAGE_TEXT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".tgme_widget_message_text").expect("valid selector"));
static CODE_BLOCKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("pre, code").expect("valid selector"));
static LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));

/// The four connection-string protocols a token can belong to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    Vless,
    Vmess,
    Ss,
    Trojan,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [
        Protocol::Vless,
        Protocol::Vmess,
        Protocol::Ss,
        Protocol::Trojan,
    ];

    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Vless => "vless",
            Protocol::Vmess => "vmess",
            Protocol::Ss => "ss",
            Protocol::Trojan => "trojan",
        }
    }

    /// Scheme plus separator; a line must start with this exactly.
    pub fn prefix(self) -> &'static str {
        match self {
            Protocol::Vless => "vless://",
            Protocol::Vmess => "vmess://",
            Protocol::Ss => "ss://",
            Protocol::Trojan => "trojan://",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Protocol::Vless => 0,
            Protocol::Vmess => 1,
            Protocol::Ss => 2,
            Protocol::Trojan => 3,
        }
    }

    /// Case-sensitive prefix match.
    pub fn detect(line: &str) -> Option<Protocol> {
        Protocol::ALL
            .into_iter()
            .find(|protocol| line.starts_with(protocol.prefix()))
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// One extracted line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub protocol: Protocol,
    pub line: String,
}

/// Which fragments of a message are scanned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextScope {
    /// Whole message text.
    #[default]
    MessageText,
    /// Only `pre` / `code` blocks.
    CodeBlocks,
}

/// Concatenate the message-bearing fragments of every page into one
/// document, pages in the given order and messages in document order.
pub fn merge_documents<'a, I>(pages: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut merged = String::from(r#"<div id="all-messages">"#);
    for markup in pages {
        let document = Html::parse_document(markup);
        for message in document.select(&MESSAGE_WRAP) {
            merged.push_str(&message.html());
        }
    }
    merged.push_str("</div>");
    merged
}

/// Extract tokens from a merged document.
pub fn extract_tokens(merged: &str, scope: TextScope) -> Vec<Token> {
    let document = Html::parse_fragment(merged);
    let mut tokens = Vec::new();

    match scope {
        TextScope::MessageText => {
            for fragment in document.select(&MESSAGE_TEXT) {
                tokens.extend(classify_lines(&fragment_text(&fragment.inner_html())));
            }
        }
        TextScope::CodeBlocks => {
            for fragment in document.select(&CODE_BLOCKS) {
                if !inside_message(&fragment) || nested_in_pre(&fragment) {
                    continue;
                }
                tokens.extend(classify_lines(&fragment_text(&fragment.inner_html())));
            }
        }
    }

    tokens
}

/// Merge then extract.
pub fn extract_from_pages<'a, I>(pages: I, scope: TextScope) -> Vec<Token>
where
    I: IntoIterator<Item = &'a str>,
{
    extract_tokens(&merge_documents(pages), scope)
}

/// Keep the trimmed lines of `text` that start with a recognised prefix.
pub fn classify_lines(text: &str) -> Vec<Token> {
    text.trim()
        .split('\n')
        .map(str::trim)
        .filter_map(|line| {
            Protocol::detect(line).map(|protocol| Token {
                protocol,
                line: line.to_string(),
            })
        })
        .collect()
}

/// Inner HTML of a fragment to plain text with `\n` line breaks.
fn fragment_text(inner_html: &str) -> String {
    let with_breaks = LINE_BREAK.replace_all(inner_html, "\n");
    let normalized = with_breaks.replace("\r\n", "\n").replace('\r', "\n");
    Html::parse_fragment(&normalized)
        .root_element()
        .text()
        .collect::<String>()
}

fn has_ancestor(element: &ElementRef<'_>, matches: impl Fn(&Element) -> bool) -> bool {
    element
        .ancestors()
        .filter_map(|node| node.value().as_element())
        .any(matches)
}

fn inside_message(element: &ElementRef<'_>) -> bool {
    has_ancestor(element, |e| e.classes().any(|c| c == "tgme_widget_message_text"))
}

fn nested_in_pre(element: &ElementRef<'_>) -> bool {
    element.value().name() == "code" && has_ancestor(element, |e| e.name() == "pre")
}
