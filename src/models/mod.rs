pub mod address;
pub mod status;

pub use address::AddressBody;
pub use status::{CounterBody, Dependency, Health, ServiceStatus, Status};
