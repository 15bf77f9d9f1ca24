pub mod banner;
pub mod command;
pub mod commands;
pub mod config;
pub mod connection;
pub mod consts;
pub mod engine;
pub mod error;
pub mod events;
pub mod job;
pub mod policy;
