//! Durable registries: services with their keys, and access grants

mod access;
mod services;

pub use access::AccessGraph;
pub use services::{ServiceRegistry, MAX_DESCRIPTION_LEN, MAX_NAME_LEN};
