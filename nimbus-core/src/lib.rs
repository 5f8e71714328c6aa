//! Nimbus Core
//!
//! Core types for the Nimbus device-cloud runner.
//!
//! This crate contains:
//! - Domain types: runs, projects, accounts and the job request model
//! - DTOs: payloads exchanged with the cloud API and the webhook endpoint

pub mod domain;
pub mod dto;
