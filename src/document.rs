pub mod position;
pub mod store;

pub(crate) mod model;

// Re-export main types
pub use model::Document;
pub use position::{PositionMapper, apply_text_edits};
pub use store::DocumentRegistry;
