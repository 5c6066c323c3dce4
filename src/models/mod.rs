//! Data models representing database entities and API payloads.

pub mod bfe;
/// Bundles, billing cycles and credit packs
pub mod bundle;
pub mod coach;
/// Credit ledger
pub mod credit;
pub mod invoice;
pub mod notification;
/// Payment provider wire types
pub mod payment;
pub mod team;
pub mod ticket;
pub mod user;
pub mod website;
