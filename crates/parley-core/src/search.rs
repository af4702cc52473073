// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Search over the flattened text of a conversation: match list and
//! current-match tracking.

use regex::Regex;

use crate::{NodeId, TextNode};

/// One located occurrence of the query.  `start..end` is a byte range into
/// the node's text on UTF-8 boundaries; `text` is what it covers, in the
/// node's own casing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpan {
    pub node: NodeId,
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// Highlighted as the current match
    pub current: bool,
}

/// Case-insensitive pattern for `query`, taken literally.  `None` for an
/// empty query.
pub fn compile(query: &str, whole_word: bool) -> Option<Regex> {
    if query.is_empty() {
        return None;
    }
    let escaped = regex::escape(query);
    let pattern = if whole_word {
        format!(r"(?i)\b{escaped}\b")
    } else {
        format!("(?i){escaped}")
    };
    Regex::new(&pattern).ok()
}

/// Every non-overlapping match of `query` in `nodes`, in document order and
/// left to right within a node.
pub fn search(nodes: &[TextNode], query: &str, whole_word: bool) -> Vec<MatchSpan> {
    let Some(re) = compile(query, whole_word) else {
        return Vec::new();
    };
    nodes
        .iter()
        .flat_map(|n| {
            re.find_iter(&n.text).map(move |m| MatchSpan {
                node: n.node,
                start: m.start(),
                end: m.end(),
                text: m.as_str().to_string(),
                current: false,
            })
        })
        .collect()
}

/// Match list with a cyclic cursor.  At most one span is current.
#[derive(Debug, Default)]
pub struct SearchIndex {
    query: String,
    whole_word: bool,
    spans: Vec<MatchSpan>,
    cursor: Option<usize>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search `nodes` for `query` and make the first match current.
    /// Returns the number of matches; an empty query clears everything.
    pub fn run(&mut self, nodes: &[TextNode], query: &str, whole_word: bool) -> usize {
        self.query = query.to_string();
        self.whole_word = whole_word;
        self.spans = search(nodes, query, whole_word);
        self.cursor = None;
        if !self.spans.is_empty() {
            self.set_cursor(0);
        }
        self.spans.len()
    }

    /// Search again with the last query, e.g. after the text changed.
    pub fn refresh(&mut self, nodes: &[TextNode]) -> usize {
        let query = std::mem::take(&mut self.query);
        self.run(nodes, &query, self.whole_word)
    }

    /// Advance to the next match, wrapping to the first.
    pub fn next(&mut self) -> Option<&MatchSpan> {
        let count = self.spans.len();
        if count == 0 {
            return None;
        }
        let index = self.cursor.map_or(0, |i| (i + 1) % count);
        self.set_cursor(index);
        self.current()
    }

    /// Step back to the previous match, wrapping to the last.
    pub fn previous(&mut self) -> Option<&MatchSpan> {
        let count = self.spans.len();
        if count == 0 {
            return None;
        }
        let index = self.cursor.map_or(count - 1, |i| (i + count - 1) % count);
        self.set_cursor(index);
        self.current()
    }

    pub fn current(&self) -> Option<&MatchSpan> {
        self.cursor.and_then(|i| self.spans.get(i))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.cursor
    }

    pub fn spans(&self) -> &[MatchSpan] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn whole_word(&self) -> bool {
        self.whole_word
    }

    /// Drop all spans because the text they point into changed.  The query
    /// is kept for [`refresh`](Self::refresh).
    pub fn invalidate(&mut self) {
        self.spans.clear();
        self.cursor = None;
    }

    /// Forget the query and all spans.
    pub fn clear(&mut self) {
        self.invalidate();
        self.query.clear();
    }

    fn set_cursor(&mut self, index: usize) {
        if let Some(prev) = self.cursor.and_then(|i| self.spans.get_mut(i)) {
            prev.current = false;
        }
        if let Some(span) = self.spans.get_mut(index) {
            span.current = true;
            self.cursor = Some(index);
        }
    }
}
