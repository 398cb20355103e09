//! Adapters between the local inputs, the cluster API and the reconciler

mod ca_bundle;
mod cluster_client;
mod codec;
mod owner_refs;
mod webhook_config;

pub use ca_bundle::*;
pub use cluster_client::*;
pub use codec::*;
pub use owner_refs::*;
pub use webhook_config::*;
