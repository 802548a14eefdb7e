use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::person::{
    DATE_INPUT_FORMAT, Person, PersonId, PersonRecord, parse_occasion_values,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{field} must be a YYYY-MM-DD date, got {value:?}")]
    BadDate { field: &'static str, value: String },
    #[error("a person cannot be their own {0}")]
    SelfReference(&'static str),
    #[error("profile picture must be a PNG, JPEG, GIF or WebP image, got {0:?}")]
    UnsupportedPicture(String),
}

/// The add/edit person form as submitted.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PersonDraft {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub date_of_death: String,
    pub marriage_date: String,
    pub profile_picture_url: Option<String>,
    pub parent_id: Option<PersonId>,
    pub spouse_id: Option<PersonId>,
    pub special_occasions: Vec<Value>,
}

fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Missing(field));
    }
    Ok(value.to_string())
}

fn optional_date(field: &'static str, value: &str) -> Result<Option<NaiveDate>, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, DATE_INPUT_FORMAT)
        .map(Some)
        .map_err(|_| ValidationError::BadDate {
            field,
            value: value.to_string(),
        })
}

impl PersonDraft {
    /// Check the draft for a new person (`editing` is `None`) or for the
    /// person with id `editing`.
    pub fn validate(&self, editing: Option<PersonId>) -> Result<PersonRecord, ValidationError> {
        if let Some(id) = editing {
            if self.parent_id == Some(id) {
                return Err(ValidationError::SelfReference("parent"));
            }
            if self.spouse_id == Some(id) {
                return Err(ValidationError::SelfReference("spouse"));
            }
        }

        Ok(PersonRecord {
            first_name: required("first_name", &self.first_name)?,
            last_name: required("last_name", &self.last_name)?,
            date_of_birth: optional_date("date_of_birth", &self.date_of_birth)?,
            date_of_death: optional_date("date_of_death", &self.date_of_death)?,
            marriage_date: optional_date("marriage_date", &self.marriage_date)?,
            profile_picture_url: self
                .profile_picture_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            parent_id: self.parent_id,
            spouse_id: self.spouse_id,
            special_occasions: parse_occasion_values(&self.special_occasions),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub id: PersonId,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RelationCandidates {
    pub parents: Vec<Candidate>,
    pub spouses: Vec<Candidate>,
}

/// Who may be picked as parent or spouse on the form. Nobody can pick
/// themselves, and the chosen parent is not offered as spouse.
pub fn relation_candidates(
    people: &[Person],
    editing: Option<PersonId>,
    parent_id: Option<PersonId>,
) -> RelationCandidates {
    let candidate = |p: &Person| Candidate {
        id: p.id,
        name: p.full_name(),
    };
    let others = || people.iter().filter(move |p| Some(p.id) != editing);

    RelationCandidates {
        parents: others().map(candidate).collect(),
        spouses: others()
            .filter(|p| Some(p.id) != parent_id)
            .map(candidate)
            .collect(),
    }
}
