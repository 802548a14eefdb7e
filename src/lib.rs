//! Family tree service: records family members for signed-in accounts and
//! serves them as a nested tree.

pub mod cli;
pub mod data;
pub mod entity;
pub mod error;
pub mod family;
pub mod server;
