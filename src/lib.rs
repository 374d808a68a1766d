pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod demo;
pub mod document;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod intercept;
pub mod middleware;
pub mod policy;
pub mod storage;
pub mod types;

pub use gateway::{Gateway, GatewayError};
pub use policy::{CollectionPolicy, PolicyRegistry};
