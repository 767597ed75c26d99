//! High-level verb API over a [`Connection`].
//!
//! One thin builder per Doozer verb, plus the one piece of nontrivial
//! client-side logic: offset-driven pagination for `getdir` and `walk`.
//!
//! Mutating verbs ([`set`](Client::set), [`del`](Client::del)) are sent
//! with `retry = false`. If the transport cannot tell whether the server
//! executed the write before a failure, the client surfaces the ambiguity
//! rather than re-issuing a write that could clobber a newer revision.

use bytes::Bytes;

use crate::conn::{Config, Connection};
use crate::error::{ErrCode, Error, Result};
use crate::msg::{Request, Response, Verb};

/// A Doozer client sharing one multiplexed [`Connection`].
///
/// Cloning is cheap; clones share the transport.
#[derive(Clone)]
pub struct Client {
    conn: Connection,
}

impl Client {
    /// Dial the cluster with default configuration.
    pub async fn connect(addrs: Vec<String>) -> Result<Self> {
        Self::connect_with_config(addrs, Config::default()).await
    }

    /// Dial the cluster with explicit transport configuration.
    pub async fn connect_with_config(addrs: Vec<String>, config: Config) -> Result<Self> {
        Ok(Client {
            conn: Connection::connect(addrs, config).await?,
        })
    }

    /// Wrap an existing connection.
    pub fn new(conn: Connection) -> Self {
        Client { conn }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Close the underlying connection.
    pub async fn disconnect(&self) {
        self.conn.disconnect().await;
    }

    /// Present an opaque access token to the server.
    pub async fn access(&self, secret: impl Into<Bytes>) -> Result<Response> {
        let request = Request {
            value: Some(secret.into()),
            ..Request::new(Verb::Access)
        };
        self.conn.send(request, true).await
    }

    /// Read the store's current revision.
    pub async fn rev(&self) -> Result<Response> {
        self.conn.send(Request::new(Verb::Rev), true).await
    }

    /// No-op round trip, useful as a liveness probe.
    pub async fn nop(&self) -> Result<Response> {
        self.conn.send(Request::new(Verb::Nop), true).await
    }

    /// Compare-and-set write: succeeds only if `rev` is at least the
    /// file's current revision (`0` for a file that must not exist yet).
    ///
    /// Non-idempotent: sent with `retry = false`.
    pub async fn set(&self, path: &str, value: impl Into<Bytes>, rev: i64) -> Result<Response> {
        let request = Request {
            path: Some(path.to_string()),
            value: Some(value.into()),
            rev: Some(rev),
            ..Request::new(Verb::Set)
        };
        self.conn.send(request, false).await
    }

    /// Compare-and-set delete.
    ///
    /// Non-idempotent: sent with `retry = false`.
    pub async fn del(&self, path: &str, rev: i64) -> Result<Response> {
        let request = Request {
            path: Some(path.to_string()),
            rev: Some(rev),
            ..Request::new(Verb::Del)
        };
        self.conn.send(request, false).await
    }

    /// Read a file, at a point-in-time revision if given.
    pub async fn get(&self, path: &str, rev: Option<i64>) -> Result<Response> {
        let request = Request {
            path: Some(path.to_string()),
            rev,
            ..Request::new(Verb::Get)
        };
        self.conn.send(request, true).await
    }

    /// Block until `path` changes at or after `rev`, returning the change.
    pub async fn wait(&self, path: &str, rev: i64) -> Result<Response> {
        let request = Request {
            path: Some(path.to_string()),
            rev: Some(rev),
            ..Request::new(Verb::Wait)
        };
        self.conn.send(request, true).await
    }

    /// Read a path's metadata (length and revision).
    pub async fn stat(&self, path: &str, rev: Option<i64>) -> Result<Response> {
        let request = Request {
            path: Some(path.to_string()),
            rev,
            ..Request::new(Verb::Stat)
        };
        self.conn.send(request, true).await
    }

    /// One directory entry of `path` at `offset`.
    ///
    /// Raises [`ErrCode::Range`] past the last entry; most callers want
    /// [`getdir_all`](Client::getdir_all) instead.
    pub async fn getdir(&self, path: &str, offset: i32, rev: Option<i64>) -> Result<Response> {
        let request = Request {
            path: Some(path.to_string()),
            offset: Some(offset),
            rev,
            ..Request::new(Verb::Getdir)
        };
        self.conn.send(request, true).await
    }

    /// One glob match of `path` at `offset`. See [`getdir`](Client::getdir).
    pub async fn walk(&self, path: &str, offset: i32, rev: Option<i64>) -> Result<Response> {
        let request = Request {
            path: Some(path.to_string()),
            offset: Some(offset),
            rev,
            ..Request::new(Verb::Walk)
        };
        self.conn.send(request, true).await
    }

    /// All directory entries of `path` from `offset` on, in offset order.
    pub async fn getdir_all(
        &self,
        path: &str,
        offset: i32,
        rev: Option<i64>,
    ) -> Result<Vec<Response>> {
        self.list(Verb::Getdir, path, offset, rev).await
    }

    /// All glob matches of `path` from `offset` on, in offset order.
    pub async fn walk_all(
        &self,
        path: &str,
        offset: i32,
        rev: Option<i64>,
    ) -> Result<Vec<Response>> {
        self.list(Verb::Walk, path, offset, rev).await
    }

    /// Offset-driven pagination shared by `getdir_all` and `walk_all`.
    ///
    /// The server returns one entry per call; an increasing offset drives
    /// the enumeration until the server answers `Range`, the documented
    /// end-of-results signal — which terminates the loop successfully.
    /// Every other error propagates unmodified.
    async fn list(
        &self,
        verb: Verb,
        path: &str,
        offset: i32,
        rev: Option<i64>,
    ) -> Result<Vec<Response>> {
        let mut entries = Vec::new();
        let mut offset = offset;
        loop {
            let request = Request {
                path: Some(path.to_string()),
                offset: Some(offset),
                rev,
                ..Request::new(verb)
            };
            match self.conn.send(request, true).await {
                Ok(response) => {
                    entries.push(response);
                    offset += 1;
                }
                Err(Error::Response(err)) if err.code == ErrCode::Range => {
                    return Ok(entries);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
