//! Data transfer objects
//!
//! Payloads exchanged with the cloud API and the inbound webhook endpoint.

pub mod notice;
pub mod run;
