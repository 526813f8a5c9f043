pub mod config;
pub mod http_api;
pub mod metrics_server;
pub mod observability;
pub mod poller;
pub mod reconcile;
pub mod setup;
pub mod snapshot;
pub mod store;

pub use poller::{PollError, Poller, SnapshotMap};
pub use snapshot::DeviceSnapshot;
