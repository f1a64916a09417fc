//! # Account metadata
//!
//! The user metadata document holds the fleet (`devices`), vehicle details
//! (`devices_meta`) and up to four named bases. The update endpoint replaces
//! the whole document, so every edit builds the complete new document from
//! the session's copy and leaves unrelated keys untouched.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::api::{ApiClient, Session};
use crate::coordinate::Coordinate;
use crate::fields::{lookup, number, scalar_text};
use crate::provider::HttpRequest;
use crate::{Error, Result};

/// Bases an account may define.
pub const MAX_BASES: usize = 4;

/// Vehicle details kept under `devices_meta.<id>`. Unset fields are left as
/// they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// `#rrggbb`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_hex: Option<String>,
}

impl DeviceDetails {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.plate.is_none()
            && self.brand.is_none()
            && self.model.is_none()
            && self.color.is_none()
            && self.color_hex.is_none()
    }

    /// The set fields, trimmed, plus `updatedAt`.
    #[must_use]
    pub fn updates(&self, now: DateTime<Utc>) -> Map<String, Value> {
        let mut updates = match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        for value in updates.values_mut() {
            if let Value::String(s) = value {
                *s = s.trim().to_string();
            }
        }
        updates.insert("updatedAt".to_string(), Value::String(timestamp(now)));
        updates
    }
}

/// A named area drawn as a four-corner polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Base {
    pub name: String,
    /// Corners as `[lat, lon]` pairs.
    pub points: Vec<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Base {
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] when the name is blank.
    pub fn new(name: &str, corners: [Coordinate; 4], now: DateTime<Utc>) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::BadRequest("a base needs a name".to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            points: corners.iter().map(|c| [c.lat, c.lon]).collect(),
            updated_at: Some(timestamp(now)),
        })
    }

    /// The four corners, when the stored polygon is complete.
    #[must_use]
    pub fn corners(&self) -> Option<[Coordinate; 4]> {
        let corners: Vec<Coordinate> =
            self.points.iter().filter_map(|&[lat, lon]| Coordinate::new(lat, lon)).collect();
        corners.try_into().ok()
    }
}

impl Session {
    /// Whether the account may edit its metadata: an `admin` role in any of
    /// the places accounts carry it, or access level 1.
    #[must_use]
    pub fn can_edit(&self) -> bool {
        let roles = [
            lookup(&self.user, &["role"]),
            lookup(&self.user, &["data", "role"]),
            lookup(&self.user, &["metadata", "role"]),
            self.metadata.as_ref().and_then(|m| lookup(m, &["role"])),
        ];
        let admin = roles
            .into_iter()
            .flatten()
            .filter_map(scalar_text)
            .any(|role| role.trim().eq_ignore_ascii_case("admin"));
        let level_one = lookup(&self.user, &["data", "nivel"]).and_then(number) == Some(1.0);

        admin || level_one
    }

    /// The document edits start from: the session metadata, or `user.data`
    /// for accounts that keep it there.
    #[must_use]
    pub fn metadata_document(&self) -> Map<String, Value> {
        self.metadata
            .as_ref()
            .and_then(Value::as_object)
            .or_else(|| lookup(&self.user, &["data"]).and_then(Value::as_object))
            .cloned()
            .unwrap_or_default()
    }

    /// The document with `updates` merged into the entry of one device.
    #[must_use]
    pub fn merged_device_meta(&self, device_id: &str, updates: &Map<String, Value>) -> Value {
        let mut metadata = self.metadata_document();

        let mut devices_meta = match metadata.remove("devices_meta") {
            Some(Value::Object(m)) => m,
            _ => Map::new(),
        };
        let mut entry = match devices_meta.remove(device_id) {
            Some(Value::Object(m)) => m,
            _ => Map::new(),
        };
        entry.extend(updates.iter().map(|(k, v)| (k.clone(), v.clone())));

        devices_meta.insert(device_id.to_string(), Value::Object(entry));
        metadata.insert("devices_meta".to_string(), Value::Object(devices_meta));
        Value::Object(metadata)
    }

    /// The document with new vehicle details for `device_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] when no detail is set or the device is
    /// not part of the fleet.
    pub fn with_device_details(
        &self, device_id: &str, details: &DeviceDetails, now: DateTime<Utc>,
    ) -> Result<Value> {
        if details.is_empty() {
            return Err(Error::BadRequest("no vehicle details to update".to_string()));
        }
        if !self.devices().is_empty() && !self.is_authorized(device_id) {
            return Err(Error::BadRequest(format!("device {device_id} is not in the fleet")));
        }
        Ok(self.merged_device_meta(device_id, &details.updates(now)))
    }

    /// Bases defined on the account. Entries that are not bases are skipped.
    #[must_use]
    pub fn bases(&self) -> Vec<Base> {
        stored_bases(&self.metadata_document())
            .into_iter()
            .filter_map(|base| serde_json::from_value(base).ok())
            .collect()
    }

    /// The document with `base` appended.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] when the account already has
    /// [`MAX_BASES`] bases.
    pub fn with_base(&self, base: &Base) -> Result<Value> {
        let mut metadata = self.metadata_document();
        let mut bases = stored_bases(&metadata);
        if bases.len() >= MAX_BASES {
            return Err(Error::BadRequest(format!("at most {MAX_BASES} bases")));
        }

        bases.push(serde_json::to_value(base)?);
        metadata.insert("bases".to_string(), Value::Array(bases));
        Ok(Value::Object(metadata))
    }

    /// The document without the base at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] when there is no base at `index`.
    pub fn without_base(&self, index: usize) -> Result<Value> {
        let mut metadata = self.metadata_document();
        let mut bases = stored_bases(&metadata);
        if index >= bases.len() {
            return Err(Error::BadRequest(format!("no base at position {index}")));
        }

        bases.remove(index);
        metadata.insert("bases".to_string(), Value::Array(bases));
        Ok(Value::Object(metadata))
    }
}

impl<P: HttpRequest> ApiClient<P> {
    /// Replace the account metadata with `metadata` and keep the new document
    /// in `session`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] when the account may not edit,
    /// [`Error::BadRequest`] when the session has no user id, otherwise the
    /// error of the update request.
    pub async fn save_metadata(&self, session: &mut Session, metadata: Value) -> Result<()> {
        if !session.can_edit() {
            return Err(Error::Forbidden("account may not edit its metadata".to_string()));
        }
        let user_id = session
            .user_id()
            .ok_or_else(|| Error::BadRequest("session has no user id".to_string()))?;

        self.update_user_metadata(&user_id, &metadata).await?;
        info!(user_id = %user_id, "account metadata saved");

        session.metadata = Some(metadata);
        Ok(())
    }
}

fn stored_bases(metadata: &Map<String, Value>) -> Vec<Value> {
    metadata.get("bases").and_then(Value::as_array).cloned().unwrap_or_default()
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}
