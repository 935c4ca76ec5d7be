//! Core types and trait definitions for famdocs.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! datastore and every remote collaborator are described here as traits;
//! `famdocs-store-sqlite` and `famdocs-remote` provide the implementations.

// Native `async fn` in traits; implementations return `Send` futures.
#![allow(async_fn_in_trait)]

pub mod claims;
pub mod document;
pub mod error;
pub mod family;
pub mod services;
pub mod store;
pub mod subscription;

pub use error::{Error, Result};
