//! Infrastructure Layer
//!
//! Bridges the domain to the outside world:
//!
//! - **protocol**: the host ⇄ sandbox message shapes and their JSON codec
//!
//! # Architecture Principles
//!
//! - Domain layer knows nothing about infrastructure
//! - Infrastructure adapts domain concepts to external protocols

pub mod protocol;

pub use protocol::{decode_reply, encode_reply, RunRequest, SandboxReply};
