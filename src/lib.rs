//! An IRC bot that counts leet announcements, tracks words and drinks, fetches URL titles and
//! answers `!`-prefixed commands.

pub mod bot;
pub mod command;
pub mod config;
pub mod console;
pub mod consts;
pub mod dispatcher;
mod error;
pub mod http;
pub mod irc;
pub mod leet;
pub mod notify;
pub mod plugin;
pub mod services;
pub mod shutdown;
pub mod title;
pub mod tracing;
pub mod trackers;
pub mod utils;

pub use bot::Bot;
pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::Error;
pub use plugin::{Plugin, Registry};
pub use services::BotServices;
