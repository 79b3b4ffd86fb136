#![forbid(unsafe_code)]

//! Identifiers and generation tokens shared by the lumen crates.

mod epoch;
mod ids;
mod retry;

pub use epoch::{Epoch, EpochCounter};
pub use ids::{MediaId, SessionId, SourceRef};
pub use retry::RetryPolicy;
