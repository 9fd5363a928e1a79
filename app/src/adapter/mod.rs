pub mod api;
pub mod shell;
