pub mod cfg;
pub mod cmd;
pub mod corpus;
pub mod engine;
pub mod error;
mod histogram;
pub mod logging;
pub mod message;
pub mod runtime;
pub mod stat;
pub mod tls;
