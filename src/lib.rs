//! # Doozer
//! Async Rust client for the Doozer coordination store.
//!
//! Doozer is a distributed, strongly-consistent coordination and
//! configuration store (in the same family as ZooKeeper and etcd),
//! reachable only through a binary RPC protocol over TCP. This crate
//! implements the client side of that protocol: a durable, multiplexed
//! logical connection that survives node failures.
//!
//! # Goals
//! - Easy to understand code
//! - Leverage best in class libraries such as [Tokio](https://tokio.rs/), [Nom](https://docs.rs/nom/latest/nom/)
//! - Survive node failures without losing in-flight requests
//! - Never silently replay a write the server may already have applied
//!
//! ## Getting started
//! Install `doozer` in your rust project with `cargo add doozer` or include
//! the following snippet in your `Cargo.toml` dependencies:
//! ```toml
//! doozer = "0.1"
//! ```
//!
//! ### Talking to a cluster
//! [`Client::connect`] takes the cluster's `host:port` address list and
//! returns a client whose calls are safe to issue concurrently from many
//! tasks; requests are correlated by tag, not by ordering.
//!
//! ```rust,no_run
//! use doozer::{Client, Error};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let client = Client::connect(vec![
//!         "127.0.0.1:8046".to_string(),
//!         "127.0.0.1:8047".to_string(),
//!     ])
//!     .await?;
//!
//!     let set = client.set("/example", "hello", 0).await?;
//!     let got = client.get("/example", None).await?;
//!     assert_eq!(got.value.as_deref(), Some(&b"hello"[..]));
//!     assert!(got.rev >= set.rev);
//!
//!     for entry in client.getdir_all("/", 0, None).await? {
//!         println!("{}", entry.path.unwrap_or_default());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Transport model
//!
//! One [`Connection`] owns exactly one live socket at a time plus a table
//! of pending requests keyed by a client-assigned tag. A background task
//! reads length-prefixed frames and resolves each response against its
//! pending entry. When the socket breaks, the connection walks a shuffled
//! address pool with exponential backoff and retransmits every pending
//! packet with its original tag, so idempotent calls complete as if
//! nothing happened. Mutating verbs (`set`, `del`) opt out of
//! retransmission and surface the ambiguity to the caller instead.
//!
//! ## Resources
//! - [Doozer protocol description](https://github.com/ha/doozerd/blob/master/doc/proto.md)

pub mod addr;
pub mod client;
pub mod conn;
pub mod constants;
pub mod encode;
pub mod error;
pub mod msg;
pub mod parser;
pub mod telemetry;

pub use client::Client;
pub use conn::{Config, Connection};
pub use error::{ErrCode, Error, ResponseError, Result};
pub use msg::{Request, Response, Verb};

/// Commonly used types, re-exported for convenience.
///
/// ```rust
/// use doozer::prelude::*;
/// ```
pub mod prelude {
    pub use crate::client::Client;
    pub use crate::conn::{Config, Connection};
    pub use crate::error::{ErrCode, Error, ResponseError, Result};
    pub use crate::msg::{Request, Response, Verb};

    pub use bytes;
}
