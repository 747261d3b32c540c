pub mod command;
pub mod traits;
