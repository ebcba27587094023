//! Configuration module

mod set;

pub use set::SetConfig;
