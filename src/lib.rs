pub mod args;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod initialize;
pub mod kubernetes;
pub mod material;
pub mod membership;
pub mod probe;
pub mod retry;
pub mod unseal;
pub mod vault;

pub use args::Args;
