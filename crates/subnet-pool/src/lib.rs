#![doc = include_str!("../README.md")]

mod batch;
mod error;
mod loader;
mod plan;
mod record;
mod retry;
mod sleep;
mod store;

pub use crate::batch::*;
pub use crate::error::*;
pub use crate::loader::*;
pub use crate::plan::*;
pub use crate::record::*;
pub use crate::retry::*;
pub use crate::sleep::*;
pub use crate::store::*;
// Re-exported so callers can build tokens without naming `tokio-util`.
pub use tokio_util::sync::CancellationToken;
