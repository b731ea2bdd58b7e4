//! Core vector data structures: distance math and index options.

pub mod distance;
pub mod option;
