pub mod device;
pub mod usage;

pub use device::{Device, Location};
pub use usage::{DaySeries, UsagePoint};
