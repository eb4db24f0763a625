//! Queued download tasks

mod model;
mod store;

pub use model::*;
pub use store::{StoreSnapshot, TaskStore};
