// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Rendering of message text for display, and flattening of a conversation
//! into plain text nodes for search.

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};

use crate::Message;
use parley_model::Role;

/// Position of a text node in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// One text-bearing node of a rendered conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextNode {
    pub node: NodeId,
    /// Index of the message the node belongs to
    pub message: usize,
    pub text: String,
}

/// Label shown above a message.
pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => "Assistant",
    }
}

/// Flatten `messages` into text nodes in document order: a header node per
/// message, then one node per Markdown text block of its content.
pub fn flatten_session(messages: &[Message]) -> Vec<TextNode> {
    let mut nodes = Vec::new();
    for (index, message) in messages.iter().enumerate() {
        let header = role_label(message.role).to_string();
        for text in std::iter::once(header).chain(text_blocks(&message.content)) {
            let node = NodeId(nodes.len());
            nodes.push(TextNode { node, message: index, text });
        }
    }
    nodes
}

/// Visible text of a Markdown document, one entry per block.
pub fn text_blocks(markdown: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let flush = |current: &mut String, blocks: &mut Vec<String>| {
        let text = current.trim_end();
        if !text.trim().is_empty() {
            blocks.push(text.to_string());
        }
        current.clear();
    };

    for event in Parser::new_ext(markdown, markdown_options()) {
        match event {
            Event::Text(t) | Event::Code(t) | Event::Html(t) | Event::InlineHtml(t) => {
                current.push_str(&t)
            }
            Event::SoftBreak => current.push(' '),
            Event::HardBreak => current.push('\n'),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::CodeBlock
                | TagEnd::Item
                | TagEnd::TableCell
                | TagEnd::HtmlBlock,
            ) => flush(&mut current, &mut blocks),
            Event::Start(Tag::Item | Tag::List(_)) => flush(&mut current, &mut blocks),
            _ => {}
        }
    }
    flush(&mut current, &mut blocks);
    blocks
}

fn markdown_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

/// Turns raw message text into markup that is safe to display.
pub trait Renderer: Send + Sync {
    fn render(&self, raw: &str) -> String;
}

/// Markdown to HTML.  Raw HTML in the input is shown as text and script
/// URLs in links and images are neutralised.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn render(&self, raw: &str) -> String {
        let events = Parser::new_ext(raw, markdown_options()).map(|event| match event {
            Event::Html(h) | Event::InlineHtml(h) => Event::Text(h),
            Event::Start(Tag::Link { link_type, dest_url, title, id }) => Event::Start(Tag::Link {
                link_type,
                dest_url: safe_url(dest_url),
                title,
                id,
            }),
            Event::Start(Tag::Image { link_type, dest_url, title, id }) => Event::Start(Tag::Image {
                link_type,
                dest_url: safe_url(dest_url),
                title,
                id,
            }),
            other => other,
        });
        let mut out = String::with_capacity(raw.len() * 3 / 2);
        html::push_html(&mut out, events);
        out
    }
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    let scheme = url.trim_start().to_ascii_lowercase();
    if ["javascript:", "vbscript:", "data:"].iter().any(|s| scheme.starts_with(s)) {
        CowStr::Borrowed("#")
    } else {
        url
    }
}

/// Plain text for a terminal.  Control characters other than newline and
/// tab are dropped so message content cannot drive the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalRenderer;

impl Renderer for TerminalRenderer {
    fn render(&self, raw: &str) -> String {
        raw.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect()
    }
}
