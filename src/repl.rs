// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Line-oriented chat front end.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use parley_core::{
    export::DEFAULT_EXPORT_FILE, export_session, flatten_session, render::role_label, ChatEngine,
    ChatEvent, ExportOutcome, FileSaveTarget, Renderer, SearchIndex, SessionId, TerminalRenderer,
    TextNode,
};

const HELP: &str = "\
Commands:
  /new                 start a new conversation
  /list [filter]       list conversations, newest first
  /switch <id>         continue another conversation
  /delete <id>         delete a conversation
  /search <text>       search the current conversation
  /word                toggle whole-word search
  /next, /prev         move between search matches
  /export [path]       save the conversation as Markdown
  /model [id]          show or change the model
  /quit                exit
Anything else is sent as a message.";

/// One parsed input line.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Message(String),
    New,
    List(Option<String>),
    Switch(SessionId),
    Delete(SessionId),
    Search(String),
    ToggleWord,
    Next,
    Prev,
    Export(Option<PathBuf>),
    Model(Option<String>),
    Help,
    Quit,
    Invalid(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_string());
    };
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((n, a)) => (n, a.trim()),
        None => (command, ""),
    };
    let arg_opt = (!arg.is_empty()).then(|| arg.to_string());
    let session_id = |what: &str| match arg.parse::<SessionId>() {
        Ok(id) => Ok(id),
        Err(_) => Err(Input::Invalid(format!("usage: /{what} <id>"))),
    };
    match name {
        "new" => Input::New,
        "list" | "ls" => Input::List(arg_opt),
        "switch" | "sw" => session_id("switch").map_or_else(|e| e, Input::Switch),
        "delete" | "rm" => session_id("delete").map_or_else(|e| e, Input::Delete),
        "search" | "find" => Input::Search(arg.to_string()),
        "word" => Input::ToggleWord,
        "next" | "n" => Input::Next,
        "prev" | "p" => Input::Prev,
        "export" => Input::Export(arg_opt.map(PathBuf::from)),
        "model" => Input::Model(arg_opt),
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        other => Input::Invalid(format!("unknown command /{other}, try /help")),
    }
}

/// Terminal output state: how much of the streamed reply is on screen and
/// the search over the active conversation.
struct Console {
    renderer: TerminalRenderer,
    streamed: usize,
    search: SearchIndex,
    whole_word: bool,
    nodes: Vec<TextNode>,
}

impl Console {
    fn new(whole_word: bool) -> Self {
        Self { renderer: TerminalRenderer, streamed: 0, search: SearchIndex::new(), whole_word, nodes: Vec::new() }
    }

    fn show(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::Progress(text) => {
                // Each event carries the whole reply so far; print what is new.
                if text.len() > self.streamed && text.is_char_boundary(self.streamed) {
                    print!("{}", self.renderer.render(&text[self.streamed..]));
                    let _ = io::stdout().flush();
                }
                self.streamed = text.len();
            }
            ChatEvent::Completed { message, .. } => {
                if self.streamed == 0 {
                    print!("{}", self.renderer.render(&message.content));
                }
                println!();
                if message.truncated {
                    println!("[reply cut short: output token limit reached]");
                }
                self.streamed = 0;
            }
            ChatEvent::TitleChanged { title, .. } => {
                tracing::debug!(title = %title, "conversation titled");
            }
            ChatEvent::Error(msg) => {
                if self.streamed > 0 {
                    println!();
                }
                eprintln!("error: {msg}");
                self.streamed = 0;
            }
            ChatEvent::Notice(msg) => eprintln!("note: {msg}"),
        }
    }

    /// The conversation changed; spans into the old text are void.
    fn invalidate(&mut self) {
        self.search.invalidate();
        self.nodes.clear();
    }

    fn run_search(&mut self, engine: &ChatEngine, query: &str) {
        let messages = engine.store().active().map(|s| s.messages.as_slice()).unwrap_or_default();
        self.nodes = flatten_session(messages);
        let count = self.search.run(&self.nodes, query, self.whole_word);
        if query.is_empty() {
            println!("search cleared");
            return;
        }
        println!("{count} match(es) for {query:?}{}", if self.whole_word { " (whole word)" } else { "" });
        self.show_current();
    }

    fn show_current(&self) {
        let (Some(span), Some(index)) = (self.search.current(), self.search.current_index()) else {
            return;
        };
        let Some(node) = self.nodes.get(span.node.0) else {
            return;
        };
        let text = &node.text;
        let before = tail_chars(&text[..span.start], 30);
        let after = head_chars(&text[span.end..], 30);
        println!(
            "[{}/{}] message {}: ...{}>>{}<<{}...",
            index + 1,
            self.search.len(),
            node.message + 1,
            self.renderer.render(before),
            self.renderer.render(&span.text),
            self.renderer.render(after),
        );
    }
}

fn tail_chars(s: &str, n: usize) -> &str {
    let start = s.char_indices().rev().nth(n.saturating_sub(1)).map_or(0, |(i, _)| i);
    &s[start..]
}

fn head_chars(s: &str, n: usize) -> &str {
    let end = s.char_indices().nth(n).map_or(s.len(), |(i, _)| i);
    &s[..end]
}

fn print_history(engine: &ChatEngine) {
    let Some(session) = engine.store().active() else {
        return;
    };
    let renderer = TerminalRenderer;
    println!("== {} ==", renderer.render(&session.title));
    for m in &session.messages {
        println!("{}:\n{}\n", role_label(m.role), renderer.render(&m.content));
    }
}

fn print_list(engine: &ChatEngine, filter: Option<&str>) {
    let rows = engine.list(filter);
    if rows.is_empty() {
        println!("no conversations match");
    }
    for row in rows {
        let marker = if row.active { "*" } else { " " };
        println!("{marker} {}  {:>3} msg  {}", row.id, row.message_count, TerminalRenderer.render(&row.title));
    }
}

/// Run the interactive loop until `/quit` or end of input.
pub async fn run(
    mut engine: ChatEngine,
    mut events: mpsc::UnboundedReceiver<ChatEvent>,
    whole_word: bool,
    interactive: bool,
) -> anyhow::Result<()> {
    let mut console = Console::new(whole_word);
    engine.open().await;
    drain(&mut events, &mut console);

    if interactive {
        println!("parley, model {}. /help for commands.", engine.model());
        if !engine.is_configured().await {
            println!("No API key configured. Run `parley set-key` first.");
        }
        print_history(&engine);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if interactive {
            print!("> ");
            let _ = io::stdout().flush();
        }
        let Some(line) = lines.next_line().await.context("reading input")? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_input(&line) {
            Input::Quit => break,
            Input::Help => println!("{HELP}"),
            Input::Invalid(msg) => eprintln!("{msg}"),
            Input::New => {
                let id = engine.new_session().await;
                console.invalidate();
                println!("new conversation {id}");
            }
            Input::List(filter) => print_list(&engine, filter.as_deref()),
            Input::Switch(id) => {
                if engine.store().get(id).is_none() {
                    eprintln!("no conversation {id}");
                } else {
                    engine.switch_to(id).await;
                    console.invalidate();
                    print_history(&engine);
                }
            }
            Input::Delete(id) => {
                if engine.store().get(id).is_none() {
                    eprintln!("no conversation {id}");
                } else {
                    engine.delete(id).await;
                    console.invalidate();
                    println!("deleted {id}");
                }
            }
            Input::Search(query) => console.run_search(&engine, &query),
            Input::ToggleWord => {
                console.whole_word = !console.whole_word;
                println!("whole-word search {}", if console.whole_word { "on" } else { "off" });
                let query = console.search.query().to_string();
                if !query.is_empty() {
                    console.run_search(&engine, &query);
                }
            }
            Input::Next => {
                if console.search.next().is_some() {
                    console.show_current();
                } else {
                    println!("no matches");
                }
            }
            Input::Prev => {
                if console.search.previous().is_some() {
                    console.show_current();
                } else {
                    println!("no matches");
                }
            }
            Input::Export(path) => export_active(&engine, path).await,
            Input::Model(None) => println!("model: {}", engine.model()),
            Input::Model(Some(id)) => {
                engine.set_model(id);
                println!("model: {}", engine.model());
            }
            Input::Message(text) => {
                console.invalidate();
                let submit = engine.submit(&text);
                tokio::pin!(submit);
                let result = loop {
                    tokio::select! {
                        res = &mut submit => break res,
                        Some(ev) = events.recv() => console.show(ev),
                    }
                };
                drain(&mut events, &mut console);
                // Api errors were already shown through the event stream.
                if let Err(e) = result {
                    if !matches!(e, parley_core::EngineError::Api(_)) {
                        eprintln!("{e}");
                    }
                }
            }
        }
        drain(&mut events, &mut console);
    }
    Ok(())
}

async fn export_active(engine: &ChatEngine, path: Option<PathBuf>) {
    let Some(session) = engine.store().active() else {
        return;
    };
    let target = FileSaveTarget::new(path.unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_FILE)));
    match export_session(session, &target, &chrono::Local::now()).await {
        Ok(ExportOutcome::Saved(p)) => println!("Chat exported to {}", p.display()),
        Ok(ExportOutcome::Cancelled) => println!("Export cancelled: file exists"),
        Ok(ExportOutcome::Failed(e)) => eprintln!("Failed to export chat: {e}"),
        Err(e) => eprintln!("{e}"),
    }
}

fn drain(events: &mut mpsc::UnboundedReceiver<ChatEvent>, console: &mut Console) {
    while let Ok(ev) = events.try_recv() {
        console.show(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(parse_input("  hello there "), Input::Message("hello there".into()));
    }

    #[test]
    fn commands_with_arguments() {
        assert_eq!(parse_input("/list rust"), Input::List(Some("rust".into())));
        assert_eq!(parse_input("/list"), Input::List(None));
        assert_eq!(parse_input("/switch 42"), Input::Switch(SessionId(42)));
        assert_eq!(parse_input("/search  alpha beta "), Input::Search("alpha beta".into()));
        assert_eq!(parse_input("/export out.md"), Input::Export(Some(PathBuf::from("out.md"))));
        assert_eq!(parse_input("/model"), Input::Model(None));
    }

    #[test]
    fn bad_commands_are_invalid() {
        assert!(matches!(parse_input("/switch abc"), Input::Invalid(_)));
        assert!(matches!(parse_input("/delete"), Input::Invalid(_)));
        assert!(matches!(parse_input("/frobnicate"), Input::Invalid(_)));
    }

    #[test]
    fn context_helpers_respect_char_boundaries() {
        assert_eq!(tail_chars("ünïcödé", 3), "ödé");
        assert_eq!(tail_chars("ab", 5), "ab");
        assert_eq!(head_chars("ünïcödé", 2), "ün");
        assert_eq!(head_chars("ab", 5), "ab");
    }
}
