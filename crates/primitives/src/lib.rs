pub mod accumulator;
pub mod dbkeys;
pub mod message;
