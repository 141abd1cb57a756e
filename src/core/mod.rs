//! Common types and helpers shared by every allocator

pub mod types;

pub use types::{align_up, is_aligned, size};
