pub mod client;
pub mod models;

pub use client::ResolverClient;
pub use models::ResolverConfig;
