//! Text document synchronization and requests for language connections.
//!
//! Sync notifications are gated per session: `didOpen` at most once per uri,
//! `didChange` only for opened uris and only with a newer version.

mod did_change;
mod did_close;
mod did_open;
mod formatting;
