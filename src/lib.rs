//! `snapblock` — a parallel block-transfer client for a cloud snapshot
//! service's Block API.
//!
//! [`engine`] holds the nine transfer operations; [`client`] defines the
//! trait surfaces a caller must supply (constructing real implementations —
//! credential discovery, SDK client construction — is out of scope for this
//! crate); [`cli`] is the binary's argument parsing and dispatch layer.

pub mod chunk;
pub mod cli;
pub mod client;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod executor;
pub mod index;
pub mod preflight;
pub mod segment;
pub mod threadpool;
