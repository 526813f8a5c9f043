#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    /// Credentials were rejected, including after a transparent token
    /// refresh. Nothing will succeed until re-authentication does.
    #[error("cloud authentication failed")]
    Auth,

    /// Network-level failure, including timeouts. Retried naturally on the
    /// next scheduled poll, never within the same call.
    #[error("cloud transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The cloud answered but carried no usable data. Non-fatal: callers
    /// treat this as "nothing to do".
    #[error("cloud returned no usable data")]
    Empty,
}

pub type CloudResult<T> = Result<T, CloudError>;
