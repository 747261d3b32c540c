pub mod scheduler;
pub mod session;
pub mod surface;
pub mod ui;
