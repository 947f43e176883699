pub mod config;
pub mod error;
pub mod follow;
pub mod lock;
pub mod scan;
pub mod shell;
pub mod store;
pub mod submit;

pub use error::{QueueError, Result};
