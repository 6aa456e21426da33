//! Protocol core: ticket issuance, validation and caching

mod authority;
mod cache;

pub use authority::TicketAuthority;
pub use cache::{CacheError, MokaTicketCache, NoopTicketCache, TicketCache, TicketKey};
