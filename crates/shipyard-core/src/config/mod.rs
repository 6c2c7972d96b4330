//! Configuration loading for shipyard.toml
//!
//! Two layers are read and merged:
//! - Global: `~/.config/shipyard/shipyard.toml`
//! - Project: `./shipyard.toml` (wins key by key)
//!
//! Command-line flags are applied on top by the frontend.

pub mod merge;
pub mod parser;
pub mod paths;
pub mod schema;
pub mod store;

pub use merge::merge_configs;
pub use parser::{parse_endpoint, parse_shipyard_toml, parse_shipyard_toml_str, to_toml};
pub use schema::{DeploySection, Settings, ShipyardConfig, SnapshotSection, VerifySection};
pub use store::{ConfigStore, Overrides};
