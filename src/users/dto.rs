use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PutTargetRequest {
    pub calories: i64,
}

#[derive(Debug, Deserialize)]
pub struct PutTimezoneRequest {
    pub timezone: String,
}
