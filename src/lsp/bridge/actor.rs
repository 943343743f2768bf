//! Actor components for bridge connections.
//!
//! # Components
//!
//! - `ResponseRouter`: Routes responses to pending requests via oneshot channels
//! - `Reader`: Per-session task that consumes inbound frames, routes responses,
//!   answers server requests and forwards notifications

mod reader;
mod response_router;

pub(crate) use reader::{ReaderContext, ReaderTaskHandle, spawn_reader_task};
pub(crate) use response_router::{ResponseRouter, RouteOutcome};
