use std::time::Duration;
use anyhow::Context;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use crate::borrow::BorrowRequest;
use crate::lifecycle::ReservationStatus;
use crate::reservation::Reservation;

/// The `notify` table of the configuration. Any URL left out disables that notification.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct NotifyConfig {
    pub reservation_url: Option<String>,
    pub borrow_url: Option<String>,
    pub status_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            reservation_url: None,
            borrow_url: None,
            status_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReservationNotice<'a> {
    pub student_name: &'a str,
    pub student_id: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub college_text: &'a str,
    pub department_text: &'a str,
    pub date: &'a str,
    pub from_time: &'a str,
    pub to_time: &'a str,
    pub duration: &'a str,
    pub studio_type: &'a str,
    pub project_title: &'a str,
    pub project_description: &'a str,
    pub equipment_needed: &'a str,
    pub supervisor: &'a str,
}

impl<'a> ReservationNotice<'a> {
    pub fn new(r: &'a Reservation, studio_type: Option<&'a str>) -> Self {
        Self {
            student_name: &r.student_name,
            student_id: &r.student_id,
            email: &r.email,
            phone: &r.phone,
            college_text: &r.college,
            department_text: &r.department,
            date: &r.date,
            from_time: &r.from_time,
            to_time: &r.to_time,
            duration: &r.duration,
            studio_type: studio_type.filter(|s| !s.is_empty()).unwrap_or("N/A"),
            project_title: &r.project_name,
            project_description: &r.about_project,
            equipment_needed: &r.needed_tools,
            supervisor: &r.supervisor,
        }
    }
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotice<'a> {
    pub student_email: &'a str,
    pub student_name: &'a str,
    pub status: ReservationStatus,
    pub date: &'a str,
    pub from_time: &'a str,
    pub to_time: &'a str,
    pub project_name: &'a str,
}

impl<'a> From<&'a Reservation> for StatusNotice<'a> {
    fn from(r: &'a Reservation) -> Self {
        Self {
            student_email: &r.email,
            student_name: &r.student_name,
            status: r.status,
            date: &r.date,
            from_time: &r.from_time,
            to_time: &r.to_time,
            project_name: &r.project_name,
        }
    }
}

/// Best effort e-mail trigger. Posting happens on a spawned task, failures are only logged.
pub struct Notifier {
    client: Option<reqwest::Client>,
    config: NotifyConfig,
}

impl Notifier {
    pub fn new(config: NotifyConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build reqwest client");
        match client {
            Ok(client) => Self { client: Some(client), config },
            Err(e) => {
                error!("Notifications disabled: {e:#}");
                Self::disabled()
            }
        }
    }
    pub fn disabled() -> Self {
        Self { client: None, config: NotifyConfig::default() }
    }

    pub fn reservation_submitted(&self, reservation: &Reservation, studio_type: Option<&str>) {
        self.post("reservation", self.config.reservation_url.as_deref(), &ReservationNotice::new(reservation, studio_type));
    }
    pub fn borrow_submitted(&self, borrow: &BorrowRequest) {
        self.post("borrow", self.config.borrow_url.as_deref(), borrow);
    }
    pub fn reservation_status_changed(&self, reservation: &Reservation) {
        self.post("status", self.config.status_url.as_deref(), &StatusNotice::from(reservation));
    }

    fn post<T: Serialize + ?Sized>(&self, what: &'static str, url: Option<&str>, payload: &T) {
        let (Some(client), Some(url)) = (&self.client, url) else {
            debug!("No {what} notification endpoint configured");
            return;
        };
        let body = match serde_json::to_value(payload) {
            Ok(body) => body,
            Err(e) => {
                error!("Serde error: {e}");
                return;
            }
        };
        let request = client.post(url).json(&body);
        rocket::tokio::spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => debug!("{what} notification sent"),
                Ok(response) => warn!("{what} notification failed, status: {}, the record was saved", response.status()),
                Err(e) => warn!("Failed to send {what} notification: {e}"),
            }
        });
    }
}
