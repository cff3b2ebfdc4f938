pub mod gather_command;
pub mod handler;
