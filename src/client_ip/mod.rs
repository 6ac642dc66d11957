//! Client address resolution and privacy transforms

pub mod privacy;
pub mod resolver;

pub use privacy::{anonymize_ip, hash_ip};
pub use resolver::{resolve_client_ip, ResolveError, FORWARDED_HEADERS};
