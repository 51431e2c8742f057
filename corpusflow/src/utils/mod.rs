//! Timestamp helpers.

mod timestamps;

pub use timestamps::{iso_timestamp, Timestamp};
