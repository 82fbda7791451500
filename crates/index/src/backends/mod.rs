//! Backing store implementations.

pub mod elasticsearch;
