pub mod content;

pub use content::{ContentState, content_routes};
