#![forbid(unsafe_code)]

pub mod api;
pub mod app;
pub mod config;
pub mod constants;
pub mod error;
pub mod observability;
pub mod route;
pub mod runtime;
pub mod scope;
pub mod upstream;
