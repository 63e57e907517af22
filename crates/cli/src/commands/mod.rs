pub mod chat;
pub mod config_cmd;
pub mod grow;
pub mod history;
pub mod runtime;
