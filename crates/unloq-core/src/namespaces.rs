//! Well-known gateway namespaces.
//!
//! Namespaces are opaque strings; these are the ones the gateway documents.
//! Any other non-empty string is accepted by the client.

/// Identity and access management events (permissions, roles, users).
pub const IAM: &str = "IAM";
