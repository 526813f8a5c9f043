use tokio::sync::Mutex;

/// Credentials plus the cached bearer token for one cloud account.
///
/// Created when the integration is set up and dropped when it is unloaded;
/// the token is never process-global state. Interior mutability lets the
/// client refresh the token behind a shared reference.
#[derive(Debug)]
pub struct CloudSession {
    email: String,
    password: String,
    token: Mutex<Option<String>>,
}

impl CloudSession {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            token: Mutex::new(None),
        }
    }

    /// Resume a session from a previously issued token. The token is still
    /// refreshed transparently if the cloud rejects it.
    pub fn with_token(
        email: impl Into<String>,
        password: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            token: Mutex::new(Some(token.into())),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    pub(crate) async fn token(&self) -> Option<String> {
        self.token.lock().await.clone()
    }

    pub(crate) async fn store_token(&self, token: String) {
        *self.token.lock().await = Some(token);
    }

    pub(crate) async fn clear_token(&self) {
        *self.token.lock().await = None;
    }
}
