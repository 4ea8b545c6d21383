//! HTTP request handlers.

pub mod accounts;
pub mod health;
