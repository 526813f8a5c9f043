pub mod client;
pub mod error;
pub mod session;

pub use client::CloudClient;
pub use error::{CloudError, CloudResult};
pub use session::CloudSession;
