//! Domain records that travel through the write-behind pipelines.

pub mod audit;
pub mod authorization;
pub mod client;
pub mod consent;

pub use audit::AuditRecord;
pub use authorization::{AuthorizationRecord, OAuthToken, TokenType};
pub use client::RegisteredClient;
pub use consent::{ConsentKey, ConsentRecord};
