pub mod chemistry;
pub mod domain;
pub mod error;
pub mod molecule;
pub mod spatial;
