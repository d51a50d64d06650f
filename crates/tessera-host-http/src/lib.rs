//! Tessera Host HTTP
//!
//! Outbound HTTP for pipeline tasks. Every request goes through a
//! [`HttpPolicy`]: unless unrestricted access is allowed, the destination
//! host is resolved up front, non-public addresses are refused, and the
//! request is pinned to the address that was checked.

mod client;
mod error;
mod policy;

pub use client::{HttpClient, HttpRequest};
pub use error::HttpError;
pub use policy::{HttpPolicy, is_public_ip};

pub use reqwest::Method;
