pub mod app;
pub mod cache;
pub mod catalog;
pub mod collector;
pub mod config;
pub mod datastore;
pub mod domain;
pub mod error;
pub mod export;
pub mod i18n;
pub mod metadata;
pub mod output;
pub mod session;
pub mod table;
pub mod transport;
pub mod tui;
