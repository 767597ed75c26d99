//! Centralized protocol and configuration constants.
//!
//! This module consolidates the magic numbers used throughout the Doozer
//! client. Having them in one place makes it easier to:
//!
//! - Understand the protocol constraints
//! - Update values consistently
//! - Document the rationale for each constant

use std::time::Duration;

// =============================================================================
// Transport Constants
// =============================================================================

/// How long a caller waits for the matching response before the transport
/// forces a reconnect (and, for idempotent requests, waits one more window).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-address TCP connect timeout. Distinct from the request/response
/// round-trip timeout above.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Initial sleep after a full pass over the address list fails. Doubled
/// after every failed round (exponential backoff).
pub const DEFAULT_RETRY_WAIT: Duration = DEFAULT_CONNECT_TIMEOUT;

/// Number of full passes over the address list before a reconnect gives up
/// with a fatal connect error.
pub const MAX_CONNECT_ROUNDS: usize = 5;

/// Maximum allowed frame size (8 MB).
///
/// Doozer values are small configuration payloads; a length prefix beyond
/// this is treated as a corrupt frame rather than an allocation request.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

// =============================================================================
// Multiplexing Constants
// =============================================================================

/// Largest assignable request tag. Tag allocation scans up from zero and
/// wraps here, so two simultaneously pending requests never share a tag.
pub const MAX_TAG: i32 = i32::MAX;
