pub mod alerts;
pub mod app;
pub mod consts;
pub mod core;
pub mod diagnostics;
pub mod logging;
pub mod messages;
pub mod model;
pub mod poll;
pub mod settings;
pub mod shell;
pub mod terminal;
pub mod transport;
