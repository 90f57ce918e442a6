//! Report output surfaces

pub mod github;
pub mod terminal;
