//! Shared domain types for the Crestline mortgage-origination platform.
//!
//! This crate holds the domain enums and the API request/response payloads
//! exchanged between the backend and its clients. Database derives are
//! gated behind the `backend` feature so non-backend consumers stay free
//! of sqlx.

pub mod dtos;
pub mod models;
