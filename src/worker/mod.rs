//! The cache-first worker
//!
//! Two handlers sharing one bucket name:
//! - the installer precaches the asset list when the install signal arrives
//! - the interceptor answers fetches from the bucket, or from the network on
//!   a miss, without ever writing to the bucket
//!
//! They are registered on a [`WorkerHost`], which owns the lifecycle.

mod host;
mod installer;
mod interceptor;
mod registration;

pub use host::{FetchHandler, InstallHandler, WorkerContainer, WorkerHost, WorkerState};
pub use installer::{InstallProgress, InstallReport, Installer, NoProgress, PartialFailurePolicy};
pub use interceptor::{FetchInterceptor, Intercepted, ResponseSource};
pub use registration::{parse_origin, resolve_assets, CacheFirstWorker};
