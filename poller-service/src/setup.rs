//! Two-step setup flow: validate credentials, then pick one of the homes on
//! the account. Each step is a discrete request/response interaction; the
//! flow value carries the partial input between them.

use cloud_client::{CloudClient, CloudError, CloudSession, Location};

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("credentials were rejected")]
    InvalidAuth,
    #[error("no locations are available for this account")]
    NoLocations,
    #[error("location {0} was not offered")]
    UnknownLocation(i64),
    #[error("setup steps submitted out of order")]
    OutOfOrder,
    #[error(transparent)]
    Cloud(#[from] CloudError),
}

/// Everything needed to persist one configured integration instance.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationEntry {
    pub title: String,
    pub email: String,
    pub password: String,
    pub home_id: i64,
}

enum SetupState {
    AwaitingCredentials,
    AwaitingLocation {
        email: String,
        password: String,
        locations: Vec<Location>,
    },
    Complete,
}

pub struct SetupFlow {
    auth_base: String,
    api_base: String,
    state: SetupState,
}

impl SetupFlow {
    pub fn new(auth_base: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            auth_base: auth_base.into(),
            api_base: api_base.into(),
            state: SetupState::AwaitingCredentials,
        }
    }

    /// Step one: validate the credentials against the token endpoint and
    /// fetch the locations to offer in step two.
    pub async fn submit_credentials(
        &mut self,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Vec<Location>, SetupError> {
        if !matches!(self.state, SetupState::AwaitingCredentials) {
            return Err(SetupError::OutOfOrder);
        }

        let email = email.into();
        let password = password.into();
        let client = CloudClient::new(
            self.auth_base.clone(),
            self.api_base.clone(),
            CloudSession::new(email.clone(), password.clone()),
        )?;

        match client.authenticate().await {
            Ok(()) => {}
            Err(CloudError::Auth) => return Err(SetupError::InvalidAuth),
            Err(e) => return Err(e.into()),
        }

        let locations = match client.locations().await {
            Ok(locations) => locations,
            Err(CloudError::Empty) => return Err(SetupError::NoLocations),
            Err(e) => return Err(e.into()),
        };
        if locations.is_empty() {
            return Err(SetupError::NoLocations);
        }

        self.state = SetupState::AwaitingLocation {
            email,
            password,
            locations: locations.clone(),
        };
        Ok(locations)
    }

    /// Step two: pick one of the offered locations and complete the flow.
    pub fn select_location(&mut self, location_id: i64) -> Result<IntegrationEntry, SetupError> {
        let SetupState::AwaitingLocation {
            email,
            password,
            locations,
        } = &self.state
        else {
            return Err(SetupError::OutOfOrder);
        };

        let location = locations
            .iter()
            .find(|l| l.id == location_id)
            .ok_or(SetupError::UnknownLocation(location_id))?;

        let entry = IntegrationEntry {
            title: location.name.clone(),
            email: email.clone(),
            password: password.clone(),
            home_id: location.id,
        };
        self.state = SetupState::Complete;
        Ok(entry)
    }
}
