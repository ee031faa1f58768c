pub mod processor;
pub mod worker;
