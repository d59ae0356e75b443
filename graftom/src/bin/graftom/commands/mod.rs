pub mod rows;
pub mod tables;
pub mod write;
