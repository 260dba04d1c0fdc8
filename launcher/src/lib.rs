pub mod app_command;
pub mod memory_probe;
pub mod supervisor;
