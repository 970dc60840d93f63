//! Core data types

pub mod sample;
pub mod temporal;

pub use sample::*;
pub use temporal::*;
