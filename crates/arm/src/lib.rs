//! # cloudhelper-arm
//!
//! Read-only access to an Azure subscription through the Resource Manager
//! REST API.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cloudhelper_arm::{ArmClient, ArmResult, CloudProvider, EnvironmentCredential};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ArmResult<()> {
//!     let client = ArmClient::builder()
//!         .credential(Arc::new(EnvironmentCredential))
//!         .build()?;
//!
//!     let groups = client
//!         .list_resource_groups("0818ef22-4784-4365-8a35-1f03e8c5e27d")
//!         .await?;
//!     for group in groups {
//!         println!("{} ({})", group.name, group.location);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod models;
pub mod provider;
pub mod transport;

pub use client::{ArmClient, ArmClientBuilder};
pub use config::{ArmConfig, RetryConfig, DEFAULT_BASE_URL};
pub use credential::{EnvironmentCredential, StaticTokenCredential, TokenCredential};
pub use error::{ArmError, ArmResult};
pub use models::{
    Resource, ResourceGroup, StorageAccount, StorageEndpoints, VirtualMachineProfile, WebApp,
};
pub use provider::{validate_subscription_id, CloudProvider};
