//! Static fabric model.
//!
//! A TOML description of switches, their segment routing configuration,
//! cables and masters, plus the in-process store that serves it to the
//! routing core. The daemon runs against it when no external controller
//! backend is wired in; tests use it as the default collaborator set.

mod config;
mod dry_run;
mod store;

pub use config::{DeviceConfig, FabricConfig, LinkConfig};
pub use dry_run::DryRunProgrammer;
pub use store::StaticFabric;
