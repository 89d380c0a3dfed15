pub mod domain;
pub mod error;
pub mod harvest;
pub mod types;
