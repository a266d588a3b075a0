//! CLI commands.

pub mod ask;
pub mod info;
pub mod status;
