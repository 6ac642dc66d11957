use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceStatus {
    Online,
    Offline,
}

/// Body of the metrics endpoint
#[derive(Debug, Serialize)]
pub struct CounterBody {
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct Status {
    pub server: ServiceStatus,
    pub database: ServiceStatus,
}

#[derive(Debug, Serialize)]
pub struct Dependency {
    pub service: String,
    pub status: ServiceStatus,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub name: String,
    pub version: String,
    pub dependencies: Vec<Dependency>,
}
