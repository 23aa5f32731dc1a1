pub mod app;
pub mod plugin;
