//! Data models for AlertBridge

mod notification;
mod rule;
mod sample;
mod verdict;

pub use notification::*;
pub use rule::*;
pub use sample::*;
pub use verdict::*;
