use rocket::{Build, Rocket};
use rocket::serde::json::Json;
use serde::Serialize;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Occupancy {
    Available,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Studio {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub capacity: u32,
    pub equipment: Vec<String>,
    pub status: Occupancy,
    pub current_booking: Option<String>,
}

pub fn studios() -> Vec<Studio> {
    vec![
        Studio {
            id: 1,
            name: "Photography Studio A".to_string(),
            kind: "Photography Studio".to_string(),
            capacity: 20,
            equipment: ["Professional Cameras", "Lighting Equipment", "Backdrops"].map(String::from).to_vec(),
            status: Occupancy::Available,
            current_booking: None,
        },
    ]
}

const DISPLAY_NAMES: &[(&str, &str)] = &[
    ("video-production", "Video Production Studio"),
    ("audio-recording", "Audio Recording Studio"),
    ("photography", "Photography Studio"),
    ("editing-suite", "Editing Suite"),
    ("live-streaming", "Live Streaming Studio"),
];

/// Human name of a studio form value, unknown values are shown as they are.
pub fn display_name(value: &str) -> String {
    DISPLAY_NAMES.iter()
        .find(|(key, _)| *key == value)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| value.to_string())
}

#[get("/api/studios")]
fn get_studios() -> Json<Vec<Studio>> {
    Json(studios())
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
        get_studios,
    ])
}
