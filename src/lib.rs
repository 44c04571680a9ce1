// Identity-provider configuration store
pub mod store;

// Wire format mapping
pub mod codec;

// Secret encryption and keyring
pub mod crypto;

// Provider lifecycle (create / read / list / update)
pub mod providers;

// Authorization redirect cache
pub mod redirect;

// Plaintext migration and key rotation
pub mod migration;

// HTTP API
pub mod api;

// Configuration loading
pub mod config;

pub mod error;

pub use error::ProviderError;

#[cfg(test)]
mod test_support;
