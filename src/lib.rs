//! Cancel Flow: backend for the subscription cancellation wizard.

pub mod api;
pub mod config;
pub mod education;
pub mod error;
pub mod flow;
pub mod notify;
pub mod retry;
pub mod server;
pub mod store;
pub mod submissions;
