use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SmartmeterError};

/// Format used for every date sent to the API.
///
/// The API wants UTC-labelled timestamps. No conversion happens here: the
/// `Z` is appended to whatever wall-clock time the caller passes in.
pub const API_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_api_date(dt: &NaiveDateTime) -> String {
    dt.format(API_DATE_FORMAT).to_string()
}

/// Event types understood by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EreignisTyp {
    /// A single point in time.
    Zeitpunkt,
    /// A time span with start and end.
    Zeitspanne,
}

/// Body of `POST w/user/ereignis`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEreignis {
    pub end_at: Option<String>,
    pub name: String,
    pub start_at: String,
    pub typ: EreignisTyp,
    pub zaehlpunkt: String,
}

impl NewEreignis {
    pub fn new(
        zaehlpunkt: &str,
        name: &str,
        date_from: &NaiveDateTime,
        date_to: Option<&NaiveDateTime>,
    ) -> Self {
        let (end_at, typ) = match date_to {
            Some(to) => (Some(format_api_date(to)), EreignisTyp::Zeitspanne),
            None => (None, EreignisTyp::Zeitpunkt),
        };
        Self {
            end_at,
            name: name.to_string(),
            start_at: format_api_date(date_from),
            typ,
            zaehlpunkt: zaehlpunkt.to_string(),
        }
    }
}

// Only the identifiers the client needs for building paths are typed; the
// rest of every response is handed back untouched.

#[derive(Debug, Deserialize)]
struct ZaehlpunktEntry {
    zaehlpunktnummer: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    default_geschaeftspartner_registration: GeschaeftspartnerRegistration,
}

#[derive(Debug, Deserialize)]
struct GeschaeftspartnerRegistration {
    geschaeftspartner: String,
}

/// First meter of the first group of a `zaehlpunkte` response.
///
/// Only that one entry is looked at; other groups and meters may be in any shape.
pub fn first_zaehlpunkt(zaehlpunkte: &serde_json::Value) -> Result<String> {
    let entry = zaehlpunkte
        .get(0)
        .and_then(|group| group.get("zaehlpunkte"))
        .and_then(|meters| meters.get(0))
        .ok_or_else(|| {
            SmartmeterError::NotFound("no zaehlpunkt registered for account".into())
        })?;
    Ok(ZaehlpunktEntry::deserialize(entry)?.zaehlpunktnummer)
}

/// Customer id (`geschaeftspartner`) of a `w/user/profile` response.
pub fn customer_id(profile: &serde_json::Value) -> Result<String> {
    let profile = Profile::deserialize(profile).map_err(|e| {
        SmartmeterError::NotFound(format!("geschaeftspartner missing from profile: {e}"))
    })?;
    Ok(profile
        .default_geschaeftspartner_registration
        .geschaeftspartner)
}
