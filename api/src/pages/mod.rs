//! Wiki pages: view, edit and save

pub mod handlers;
pub mod render;

pub use handlers::{EditHandler, SaveForm, SaveHandler, ViewHandler};
