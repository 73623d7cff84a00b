pub mod control;
pub mod tables;
