mod adapter;
mod registries;

pub use adapter::V773Adapter;
pub use registries::build_registry_packets;
