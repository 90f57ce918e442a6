//! CLI commands

pub mod fp;
pub mod init;
pub mod review;
