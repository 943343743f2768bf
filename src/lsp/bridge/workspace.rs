//! Workspace-level notifications and requests for language connections.

mod rename_files;
