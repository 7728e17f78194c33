//! Default implementations of [crate::resolver::Resolver]

pub mod endpoints;
pub mod fixed;
