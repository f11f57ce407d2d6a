pub mod domain;
pub mod error;
pub mod position;
pub mod protocol;
