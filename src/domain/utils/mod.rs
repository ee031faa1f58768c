pub mod cache;
pub mod id;
