//! # relay-core
//!
//! Shared vocabulary for the relay crates:
//!
//! - **IDs**: [`ConnectionId`], unique per registered session
//! - **Frames**: [`Frame`], the text or binary payload queued to a session
//! - **Errors**: [`RelayError`] taxonomy with wire [`ErrorCode`]s
//! - **Logging**: subscriber bootstrap and log capture for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod frame;
pub mod ids;
pub mod logging;

pub use errors::{ErrorCode, RelayError, Result, SendFailureReason};
pub use frame::{Frame, FrameKind};
pub use ids::ConnectionId;
