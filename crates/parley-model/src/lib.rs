// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod catalog;
mod error;
mod managed;
mod mock;
mod raw;
mod transport;
mod types;

pub use catalog::ModelCapability;
pub use error::ApiError;
pub use managed::ManagedTransport;
pub use mock::{Script, ScriptedTransport};
pub use raw::RawSseTransport;
pub use transport::{select_transport, EventStream, Transport};
pub use types::*;
