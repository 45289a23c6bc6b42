//! Request handlers.

pub mod health;
pub mod panels;
pub mod styles;

pub use health::*;
pub use panels::*;
pub use styles::*;
