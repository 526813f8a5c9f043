use serde::{Deserialize, Serialize};

/// One device attached to a cloud home, as reported by the device listing.
///
/// Field names follow the cloud API's camelCase payload. `version` on the
/// wire is the firmware version; the hardware revision ships separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub identifier: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub hardware_version: Option<String>,
    #[serde(rename = "version", default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub online_state: Option<String>,
    #[serde(default)]
    pub wifi_strength: Option<f64>,
}

impl Device {
    pub const WATERMETER_KIND: &'static str = "watermeter";

    pub fn is_watermeter(&self) -> bool {
        self.kind == Self::WATERMETER_KIND
    }

    /// Identifier with path separators flattened, safe for use as a series
    /// key or URL-free snapshot key.
    pub fn sanitized_id(&self) -> String {
        self.identifier.replace('/', "_")
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Watermeter")
    }
}

/// A home/location tied to the cloud account, offered during setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub name: String,
}
