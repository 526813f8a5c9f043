pub mod api;
pub mod domain;

pub use api::{CloudClient, CloudError, CloudResult, CloudSession};
pub use domain::{DaySeries, Device, Location, UsagePoint};
