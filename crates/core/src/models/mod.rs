//! Data models for AttendMax

mod attendance;
mod directory;
mod token;

pub use attendance::*;
pub use directory::*;
pub use token::*;
