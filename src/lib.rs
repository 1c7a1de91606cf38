pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod request;
pub mod response;
pub mod server;
