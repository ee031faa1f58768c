pub mod assignment;
pub mod compiler;
pub mod processor;
pub mod task;
pub mod utils;
pub mod vdag;
