use serde::{Deserialize, Serialize};

use crate::data::configuration::ConfigCheck;

#[derive(Debug, Default, Deserialize)]
pub struct TreeQuery {
    pub selected: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CandidatesQuery {
    pub editing: Option<i32>,
    pub parent: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct UploadPictureResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ConfigHealthResponse {
    pub ok: bool,
    pub checks: Vec<ConfigCheck>,
}
