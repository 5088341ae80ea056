//! Persistence layer - Durable instance registry

mod registry;

pub use registry::Registry;
