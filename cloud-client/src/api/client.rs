use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use time::macros::format_description;
use time::Date;
use tracing::{debug, warn};

use crate::api::error::{CloudError, CloudResult};
use crate::api::session::CloudSession;
use crate::domain::{DaySeries, Device, Location};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticated client for the cloud watermeter API.
///
/// The auth service and the data API live on separate hosts, so both base
/// URLs are constructor parameters (tests point them at a mock server).
pub struct CloudClient {
    http: reqwest::Client,
    auth_base: String,
    api_base: String,
    session: CloudSession,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct DevicesEnvelope {
    #[serde(default)]
    data: Option<DevicesData>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct DevicesData {
    home: Option<HomePayload>,
}

#[derive(Deserialize)]
struct HomePayload {
    #[serde(default)]
    devices: Vec<Device>,
}

impl CloudClient {
    pub fn new(
        auth_base: impl Into<String>,
        api_base: impl Into<String>,
        session: CloudSession,
    ) -> CloudResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            auth_base: auth_base.into().trim_end_matches('/').to_string(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    /// Exchange the account credentials for a bearer token and cache it on
    /// the session.
    pub async fn authenticate(&self) -> CloudResult<()> {
        let url = format!("{}/v1/auth/account/token", self.auth_base);
        debug!(email = self.session.email(), "requesting bearer token");

        let response = self
            .http
            .get(&url)
            .basic_auth(self.session.email(), Some(self.session.password()))
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "token request rejected");
            return Err(CloudError::Auth);
        }

        let body: TokenResponse = response.json().await?;
        match body.access_token {
            Some(token) => {
                debug!("bearer token received");
                self.session.store_token(token).await;
                Ok(())
            }
            None => {
                warn!("token endpoint answered without an access_token");
                Err(CloudError::Auth)
            }
        }
    }

    /// Homes attached to the account, for the setup flow's location step.
    pub async fn locations(&self) -> CloudResult<Vec<Location>> {
        let url = format!("{}/locations", self.api_base);
        let response = self.get_authed(&url).await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "failed to fetch locations");
            return Err(CloudError::Empty);
        }

        Ok(response.json::<Vec<Location>>().await?)
    }

    /// Structural metadata for every device registered to a home.
    ///
    /// A body carrying an `errors` key is an error payload even when the
    /// HTTP status says otherwise; it surfaces as [`CloudError::Empty`] so
    /// the caller can fail the cycle with context already logged.
    pub async fn devices(&self, home_id: i64) -> CloudResult<Vec<Device>> {
        let url = format!("{}/homes/{home_id}/devices", self.api_base);
        let response = self.get_authed(&url).await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), home_id, "failed to fetch device list");
            return Err(CloudError::Empty);
        }

        let envelope: DevicesEnvelope = response.json().await?;
        if let Some(errors) = envelope.errors {
            warn!(%errors, home_id, "device list answered with an error payload");
            return Err(CloudError::Empty);
        }

        Ok(envelope
            .data
            .and_then(|d| d.home)
            .map(|h| h.devices)
            .unwrap_or_default())
    }

    /// Hourly usage series for one device and one calendar day.
    ///
    /// The timezone name is passed through opaquely; the cloud performs its
    /// own day bucketing. Hours of the day not yet reached come back with
    /// `water: null`.
    pub async fn hourly_series(
        &self,
        identifier: &str,
        day: Date,
        timezone: &str,
    ) -> CloudResult<DaySeries> {
        let date_format = format_description!("[year]-[month]-[day]");
        let date = day.format(&date_format).map_err(|e| {
            warn!(error = %e, "failed to format requested day");
            CloudError::Empty
        })?;

        let url = format!(
            "{}/devices/{}/usage?date={}&timezone={}",
            self.api_base,
            urlencoding::encode(identifier),
            date,
            urlencoding::encode(timezone),
        );

        let response = self.get_authed(&url).await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), identifier, date, "failed to fetch hourly series");
            return Err(CloudError::Empty);
        }

        Ok(response.json::<DaySeries>().await?)
    }

    /// GET with the cached bearer token, refreshing it transparently once if
    /// the cloud rejects it. Callers never see "expired" and "never
    /// authenticated" as distinct failures.
    async fn get_authed(&self, url: &str) -> CloudResult<reqwest::Response> {
        let token = self.bearer_token().await?;
        let response = self.http.get(url).bearer_auth(&token).send().await?;
        if !is_auth_failure(response.status()) {
            return Ok(response);
        }

        debug!("bearer token rejected, re-authenticating");
        self.session.clear_token().await;
        self.authenticate().await?;

        let token = self.bearer_token().await?;
        let response = self.http.get(url).bearer_auth(&token).send().await?;
        if is_auth_failure(response.status()) {
            return Err(CloudError::Auth);
        }
        Ok(response)
    }

    async fn bearer_token(&self) -> CloudResult<String> {
        if let Some(token) = self.session.token().await {
            return Ok(token);
        }
        self.authenticate().await?;
        self.session.token().await.ok_or(CloudError::Auth)
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}
