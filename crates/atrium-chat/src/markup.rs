// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inline `**bold**` markup in message content.

const MARKER: &str = "**";

/// A run of message text with uniform styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span<'a> {
    Plain(&'a str),
    Bold(&'a str),
}

impl<'a> Span<'a> {
    pub fn text(&self) -> &'a str {
        match self {
            Span::Plain(text) | Span::Bold(text) => text,
        }
    }
}

/// Split `text` into plain and bold spans.
///
/// A marker without a closing partner, or an empty pair (`****`), is kept as
/// literal text. Empty plain runs are never emitted.
pub fn parse_spans(text: &str) -> Vec<Span<'_>> {
    let mut spans = Vec::new();
    let mut rest = text;
    let mut plain_start = 0;
    let mut cursor = 0;

    while let Some(open) = rest.find(MARKER) {
        let inner_start = open + MARKER.len();
        let Some(close) = rest[inner_start..].find(MARKER) else {
            break;
        };
        let inner = &rest[inner_start..inner_start + close];
        let consumed = inner_start + close + MARKER.len();

        if inner.is_empty() {
            // `****` stays literal; resume scanning after it.
            cursor += consumed;
            rest = &rest[consumed..];
            continue;
        }

        let plain = &text[plain_start..cursor + open];
        if !plain.is_empty() {
            spans.push(Span::Plain(plain));
        }
        spans.push(Span::Bold(inner));

        cursor += consumed;
        plain_start = cursor;
        rest = &rest[consumed..];
    }

    if plain_start < text.len() {
        spans.push(Span::Plain(&text[plain_start..]));
    }
    spans
}

/// Content with every bold marker pair removed.
pub fn strip_markup(text: &str) -> String {
    parse_spans(text).iter().map(Span::text).collect()
}
