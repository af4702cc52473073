// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use parley_core::SessionId;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "parley",
    about = "A terminal chat client with persistent, searchable conversations",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config file (overrides auto-discovery)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Model to use, e.g. "claude-3-5-haiku-latest"
    #[arg(long, short = 'M', env = "PARLEY_MODEL", global = true)]
    pub model: Option<String>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive chat (the default).  Type /help inside for commands.
    Chat,
    /// List saved conversations, newest first
    Sessions {
        /// Only list conversations whose title or messages contain this text
        #[arg(long, short = 'f')]
        filter: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export a conversation as Markdown
    Export {
        /// Conversation id as shown by `parley sessions`
        id: SessionId,
        /// Output file or directory (default: ./chat-export.md)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
    /// Store the API key.  Reads it from stdin when not given.
    SetKey {
        key: Option<String>,
    },
    /// List the models in the built-in capability table
    Models {
        /// Output as JSON instead of a formatted table
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration and exit
    ShowConfig,
    /// Generate shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "parley", &mut std::io::stdout());
}

pub fn is_stdin_tty() -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        unsafe { libc::isatty(std::io::stdin().as_raw_fd()) != 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}
