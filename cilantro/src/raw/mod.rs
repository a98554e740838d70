pub mod cli;
pub mod heaps;
pub mod indices;
pub mod tables;
