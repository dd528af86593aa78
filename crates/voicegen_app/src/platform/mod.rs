mod app;
mod commands;
mod effects;
mod logging;
mod render;
mod settings;

pub use commands::run;
