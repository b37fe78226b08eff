pub mod build;
pub mod search;
