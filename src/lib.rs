pub mod cmd;
pub mod common;
pub mod core;
pub mod fs;
pub mod scan;
pub mod store;
