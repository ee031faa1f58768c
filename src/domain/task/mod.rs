pub mod global_task;
