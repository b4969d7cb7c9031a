//! Client core for the Medhasmind learning platform.
//!
//! ARCHITECTURE
//! ============
//! `gateway::BackendGateway` is the only code that talks to the hosted
//! identity-and-data service (through `backend::BackendService`) and the only
//! writer of the durable session token (`token_store`). Every operation
//! returns an `envelope::Envelope`. `session::SessionStore` sits on top and
//! publishes the signed-in identity to subscribers.

pub mod backend;
pub mod config;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod session;
pub mod token_store;
pub mod types;
pub mod validation;
