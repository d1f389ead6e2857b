//! Slack markup to host rich text.
//!
//! Translation runs in a fixed order: references are resolved first, then
//! emoji shortcodes, then `*bold*` and `_italic_` spans, then line breaks.

use crate::{directory::NameResolver, emoji};

/// A piece of Slack text: literal text or an angle-bracket reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Text(&'a str),
    /// `<@U123>` or `<@U123|label>`.
    User { id: &'a str, label: Option<&'a str> },
    /// `<#C123>` or `<#C123|label>`.
    Channel { id: &'a str, label: Option<&'a str> },
    /// Anything else in brackets, e.g. `<https://example.com|site>`.
    Link { target: &'a str, label: Option<&'a str> },
}

/// Parse one reference starting right after a `<`.
///
/// Returns the token and the number of bytes consumed including the
/// closing `>`, or `None` if the bracket does not close a reference.
fn parse_reference(rest: &str) -> Option<(Token<'_>, usize)> {
    let sigil = rest.chars().next().filter(|c| *c != '\n')?;
    let body_start = sigil.len_utf8();
    let body = &rest[body_start..];

    let payload_end = body.find(['|', '>'])?;
    let (label, close) = if body[payload_end..].starts_with('|') {
        let label_start = payload_end + 1;
        let label_len = body[label_start..].find('>')?;
        let label = &body[label_start..label_start + label_len];
        (
            Some(label).filter(|l| !l.is_empty()),
            label_start + label_len,
        )
    } else {
        (None, payload_end)
    };

    let id = &body[..payload_end];
    let token = match sigil {
        '@' => Token::User { id, label },
        '#' => Token::Channel { id, label },
        _ => Token::Link {
            target: &rest[..body_start + payload_end],
            label,
        },
    };
    Some((token, body_start + close + 1))
}

/// Split Slack text into literal text and references.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find('<') {
        let open = cursor + offset;
        match parse_reference(&text[open + 1..]) {
            Some((token, consumed)) => {
                if literal_start < open {
                    tokens.push(Token::Text(&text[literal_start..open]));
                }
                tokens.push(token);
                cursor = open + 1 + consumed;
                literal_start = cursor;
            },
            None => cursor = open + 1,
        }
    }
    if literal_start < text.len() {
        tokens.push(Token::Text(&text[literal_start..]));
    }
    tokens
}

async fn render_references(text: &str, names: &dyn NameResolver) -> String {
    let mut out = String::with_capacity(text.len());
    for token in tokenize(text) {
        match token {
            Token::Text(t) => out.push_str(t),
            Token::User { label: Some(l), .. } | Token::Channel { label: Some(l), .. } => {
                out.push_str(l);
            },
            Token::User { id, label: None } => {
                let name = names.resolve_user(id, &format!("unknown:{id}")).await;
                out.push('@');
                out.push_str(&name);
            },
            Token::Channel { id, label: None } => {
                let name = names.resolve_channel(id, &format!("unknown:{id}")).await;
                out.push('#');
                out.push_str(&name);
            },
            Token::Link { target, label } => {
                if let Some(l) = label {
                    out.push_str(l);
                    out.push(':');
                }
                out.push_str(target);
            },
        }
    }
    out
}

/// Text split on a delimiter into plain and marked spans.
#[derive(Debug, PartialEq, Eq)]
enum Span<'a> {
    Plain(&'a str),
    Marked(&'a str),
}

/// Pair delimiters left to right. A trailing unpaired delimiter is plain.
fn spans(text: &str, delim: char) -> Vec<Span<'_>> {
    let mut spans = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find(delim) {
        let inner = &rest[open + delim.len_utf8()..];
        let Some(close) = inner.find(delim) else {
            break;
        };
        if open > 0 {
            spans.push(Span::Plain(&rest[..open]));
        }
        spans.push(Span::Marked(&inner[..close]));
        rest = &inner[close + delim.len_utf8()..];
    }
    if !rest.is_empty() {
        spans.push(Span::Plain(rest));
    }
    spans
}

fn apply_tag(text: &str, delim: char, tag: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for span in spans(text, delim) {
        match span {
            Span::Plain(t) => out.push_str(t),
            Span::Marked(t) => {
                out.push('<');
                out.push_str(tag);
                out.push('>');
                out.push_str(t);
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            },
        }
    }
    out
}

fn line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', " <br/>\n")
}

/// Translate Slack text into host rich text.
pub async fn translate(text: &str, names: &dyn NameResolver) -> String {
    let resolved = render_references(text, names).await;
    let emojized = emoji::emojize(&resolved);
    let bold = apply_tag(&emojized, '*', "b");
    let italic = apply_tag(&bold, '_', "i");
    line_breaks(&italic)
}
