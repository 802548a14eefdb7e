use chrono::{DateTime, NaiveDate, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type PersonId = i32;
pub type UserId = String;

pub const DATE_INPUT_FORMAT: &str = "%Y-%m-%d";

/// A dated event attached to a person, e.g. a graduation or an anniversary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialOccasion {
    pub name: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One family member as held in memory for a single page load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Person {
    pub id: PersonId,
    pub owner_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
    pub marriage_date: Option<NaiveDate>,
    pub profile_picture_url: Option<String>,
    pub parent_id: Option<PersonId>,
    pub spouse_id: Option<PersonId>,
    pub special_occasions: Vec<SpecialOccasion>,
    pub created_at: DateTime<Utc>,
}

impl Person {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Avatar fallback: first letter of each name.
    pub fn initials(&self) -> String {
        self.first_name
            .chars()
            .take(1)
            .chain(self.last_name.chars().take(1))
            .collect()
    }
}

/// The writable fields of a person, already validated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersonRecord {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
    pub marriage_date: Option<NaiveDate>,
    pub profile_picture_url: Option<String>,
    pub parent_id: Option<PersonId>,
    pub spouse_id: Option<PersonId>,
    pub special_occasions: Vec<SpecialOccasion>,
}

#[derive(Debug, Deserialize)]
struct RawOccasion {
    #[serde(default, alias = "title")]
    name: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl RawOccasion {
    fn into_occasion(self) -> Option<SpecialOccasion> {
        let name = self.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())?;
        let date = NaiveDate::parse_from_str(self.date?.trim(), DATE_INPUT_FORMAT).ok()?;
        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        Some(SpecialOccasion {
            name,
            date,
            description,
        })
    }
}

/// Parse loosely-typed occasion entries, keeping order and dropping the
/// malformed ones.
pub fn parse_occasion_values(values: &[Value]) -> Vec<SpecialOccasion> {
    values
        .iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let parsed = serde_json::from_value::<RawOccasion>(value.clone())
                .ok()
                .and_then(RawOccasion::into_occasion);
            if parsed.is_none() {
                warn!("Dropping malformed special occasion at index {index}: {value}");
            }
            parsed
        })
        .collect()
}

/// Parse the stored occasions blob. An empty or unreadable blob yields no
/// occasions.
pub fn parse_occasions(blob: &str) -> Vec<SpecialOccasion> {
    let blob = blob.trim();
    if blob.is_empty() || blob == "null" {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<Value>>(blob) {
        Ok(values) => parse_occasion_values(&values),
        Err(e) => {
            warn!("Ignoring unreadable special occasions blob: {e}");
            Vec::new()
        }
    }
}

pub fn occasions_to_blob(occasions: &[SpecialOccasion]) -> String {
    // A Vec of plain structs always serializes.
    serde_json::to_string(occasions).unwrap_or_else(|_| "[]".to_string())
}
