pub mod action;
pub mod audit;
pub mod auth;
pub mod condition;
pub mod config;
pub mod cron;
pub mod dispatcher;
pub mod engine;
pub mod entity;
pub mod error;
pub mod execution;
pub mod executor;
pub mod handler;
pub mod io;
pub mod paths;
pub mod rule;
pub mod store;
pub mod types;

pub use engine::{Components, Decision, Engine};
pub use error::{ErrorClass, Result, RuleflowError};
