pub mod config;
pub mod context;
pub mod gamepad;
pub mod input;
pub mod serial;

pub use context::AppContext;
