//! # unloq-core
//!
//! Foundation types for the UNLOQ events client.
//!
//! This crate provides the shared vocabulary the transport and client crates
//! depend on:
//!
//! - **Errors**: [`EventsError`] taxonomy and the remote [`ServerError`] via `thiserror`
//! - **Events**: [`Delivery`], the event value handed to subscription callbacks
//! - **Matchers**: [`Filter`] / [`Matcher`] deciding which event types a callback sees
//! - **Registry**: [`SubscriptionRegistry`], namespace → ordered registrations
//! - **Logging**: [`logging::init_subscriber`] for binaries and examples

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod event;
pub mod logging;
pub mod matcher;
pub mod namespaces;
pub mod registry;

pub use errors::{EventsError, ServerError};
pub use event::Delivery;
pub use matcher::{Filter, Matcher};
pub use registry::{EventCallback, Registered, Registration, SubscriptionRegistry, Unregistered};
