use std::backtrace::Backtrace;
use anyhow::anyhow;
use log::{error, warn};
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::Serialize;
use crate::lifecycle::Transition;
use crate::store::StaleVersion;

pub(crate) fn anyhow_to_custom_error(err: anyhow::Error) -> Custom<String> {
    if let Some(stale) = err.downcast_ref::<StaleVersion>() {
        warn!("Write refused: {stale}");
        return Custom(Status::Conflict, stale.to_string());
    }
    error!("Error: {err}\nbacktrace: {}", Backtrace::capture());
    Custom(Status::InternalServerError, format!("Error: {}", err))
}
pub(crate) fn sqlx_to_anyhow(err: sqlx::Error) -> anyhow::Error {
    error!("SQL Error: {err}\nbacktrace: {}", Backtrace::capture());
    anyhow!("SQL error: {}", err)
}

pub(crate) fn transition_to_response<S: Serialize>(outcome: Transition<S>, what: &str, id: &str) -> Result<Json<Transition<S>>, Custom<String>> {
    match outcome {
        Transition::NotFound => Err(Custom(Status::NotFound, format!("{what} {id} not found"))),
        outcome => Ok(Json(outcome)),
    }
}

/// Current UTC date as "YYYY-MM-DD".
pub(crate) fn today_iso() -> String {
    chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_version_maps_to_conflict() {
        let err: anyhow::Error = StaleVersion { key: "classes".into(), expected: 3 }.into();
        assert_eq!(anyhow_to_custom_error(err).0, Status::Conflict);
        assert_eq!(anyhow_to_custom_error(anyhow!("disk full")).0, Status::InternalServerError);
    }

    #[test]
    fn test_today_iso_shape() {
        let today = today_iso();
        assert_eq!(today.len(), 10);
        assert!(crate::walltime::weekday_of(&today).is_some());
    }
}
