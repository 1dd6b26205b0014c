use log::info;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{Build, Rocket, State};
use serde::{Deserialize, Serialize};
use studiobook_proc_macros::ChangedFields;
use crate::record::{is_blank, lenient_i64, lenient_text};
use crate::store::{CollectionKey, Repository};
use crate::util::{anyhow_to_custom_error, today_iso};
use crate::walltime::{to_24_hour, weekday_of};

pub const DEFAULT_MAX_STUDENTS: i64 = 20;

/// A fixed class occupying a studio. `time` holds the canonical "HH:MM-HH:MM" range.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", from = "StoredClass")]
pub struct ClassSession {
    pub id: i64,
    pub name: String,
    pub instructor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub studio: Option<String>,
    pub date: String,
    pub time: String,
    pub students: i64,
    pub max_students: i64,
    /// Recurring weekday, 0 is Sunday. When missing the weekday of `date` is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u32>,
}

/// First two '-' separated parts of a range token, anything after the second part is ignored.
pub fn split_range(token: &str) -> (&str, Option<&str>) {
    let mut parts = token.split('-');
    (parts.next().unwrap_or_default(), parts.next())
}

pub fn canonical_range(start: &str, end: &str) -> String {
    format!("{}-{}", to_24_hour(start.trim()), to_24_hour(end.trim()))
}

impl ClassSession {
    /// Start and end of the time range, `None` without a '-' separator.
    pub fn time_range(&self) -> Option<(&str, &str)> {
        match split_range(&self.time) {
            (start, Some(end)) => Some((start, end)),
            (_, None) => None,
        }
    }
    pub fn weekday(&self) -> Option<u32> {
        self.day_of_week.or_else(|| weekday_of(&self.date))
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct StoredClass {
    #[serde(deserialize_with = "lenient_i64")]
    id: Option<i64>,
    #[serde(deserialize_with = "lenient_text")]
    name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    instructor: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    studio: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    date: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    time: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    start_time: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    end_time: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    students: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    max_students: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    day_of_week: Option<i64>,
}

impl From<StoredClass> for ClassSession {
    fn from(c: StoredClass) -> Self {
        let time = match (c.time, c.start_time, c.end_time) {
            (Some(time), _, _) if time.contains('-') => {
                let (start, end) = split_range(&time);
                canonical_range(start, end.unwrap_or_default())
            }
            (time, Some(start), Some(end)) if time.as_deref().is_none_or(is_blank) => canonical_range(&start, &end),
            (time, _, _) => time.unwrap_or_default(),
        };
        Self {
            id: c.id.unwrap_or_default(),
            name: c.name.unwrap_or_default(),
            instructor: c.instructor.unwrap_or_default(),
            studio: c.studio.filter(|s| !is_blank(s)),
            date: c.date.unwrap_or_default(),
            time,
            students: c.students.unwrap_or_default(),
            max_students: c.max_students.unwrap_or_default(),
            day_of_week: c.day_of_week.filter(|d| (0..7).contains(d)).map(|d| d as u32),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PostedClass {
    #[serde(alias = "className")]
    pub name: String,
    pub instructor: String,
    #[serde(default)]
    pub date: Option<String>,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub max_students: Option<i64>,
    #[serde(default)]
    pub studio: Option<String>,
    #[serde(default)]
    pub day_of_week: Option<u32>,
}

#[derive(Deserialize, ChangedFields, Default, Debug)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassUpdate {
    #[serde(alias = "className")]
    pub name: Option<String>,
    pub instructor: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub max_students: Option<i64>,
    pub studio: Option<String>,
}

pub fn new_class(id: i64, posted: PostedClass) -> ClassSession {
    let date = posted.date.filter(|d| !is_blank(d)).unwrap_or_else(today_iso);
    ClassSession {
        id,
        name: posted.name,
        instructor: posted.instructor,
        studio: posted.studio.filter(|s| !is_blank(s)),
        date,
        time: canonical_range(&posted.start_time, &posted.end_time),
        students: 0,
        max_students: posted.max_students.filter(|n| *n > 0).unwrap_or(DEFAULT_MAX_STUDENTS),
        day_of_week: posted.day_of_week.filter(|d| *d < 7),
    }
}

impl ClassUpdate {
    pub fn apply_to(self, class: &mut ClassSession) {
        if self.start_time.is_some() || self.end_time.is_some() {
            let (start, end) = split_range(&class.time);
            let start = self.start_time.as_deref().unwrap_or(start);
            let end = self.end_time.as_deref().unwrap_or(end.unwrap_or_default());
            class.time = canonical_range(start, end);
        }
        if let Some(name) = self.name {
            class.name = name;
        }
        if let Some(instructor) = self.instructor {
            class.instructor = instructor;
        }
        if let Some(date) = self.date.filter(|d| !is_blank(d)) {
            class.date = date;
        }
        if let Some(max_students) = self.max_students.filter(|n| *n > 0) {
            class.max_students = max_students;
        }
        if let Some(studio) = self.studio {
            class.studio = Some(studio).filter(|s| !is_blank(s));
        }
    }
}

#[get("/api/classes")]
async fn get_classes(repo: &State<Repository>) -> Json<Vec<ClassSession>> {
    Json(repo.load::<ClassSession>(CollectionKey::Classes).await.records)
}

#[post("/api/classes", data = "<posted>")]
async fn post_class(posted: Json<PostedClass>, repo: &State<Repository>) -> Result<Json<ClassSession>, Custom<String>> {
    let mut coll = repo.load::<ClassSession>(CollectionKey::Classes).await;
    let highest = coll.records.iter().map(|c| c.id).max().unwrap_or(0);
    let id = repo.next_id(CollectionKey::Classes, highest).await.map_err(anyhow_to_custom_error)?;
    let class = new_class(id, posted.into_inner());
    coll.records.push(class.clone());
    repo.save(CollectionKey::Classes, &mut coll).await.map_err(anyhow_to_custom_error)?;
    info!("Class added, id: {}, time: {}", class.id, class.time);
    Ok(Json(class))
}

#[put("/api/classes/<id>", data = "<update>")]
async fn put_class(id: i64, update: Json<ClassUpdate>, repo: &State<Repository>) -> Result<Json<ClassSession>, Custom<String>> {
    let mut coll = repo.load::<ClassSession>(CollectionKey::Classes).await;
    let Some(class) = coll.records.iter_mut().find(|c| c.id == id) else {
        return Err(Custom(Status::NotFound, format!("Class {id} not found")));
    };
    let update = update.into_inner();
    info!("Class {id} update, fields: {:?}", update.changed_fields());
    update.apply_to(class);
    let class = class.clone();
    repo.save(CollectionKey::Classes, &mut coll).await.map_err(anyhow_to_custom_error)?;
    Ok(Json(class))
}

#[delete("/api/classes/<id>")]
async fn delete_class(id: i64, repo: &State<Repository>) -> Result<(), Custom<String>> {
    let mut coll = repo.load::<ClassSession>(CollectionKey::Classes).await;
    let before = coll.records.len();
    coll.records.retain(|c| c.id != id);
    if coll.records.len() == before {
        return Err(Custom(Status::NotFound, format!("Class {id} not found")));
    }
    repo.save(CollectionKey::Classes, &mut coll).await.map_err(anyhow_to_custom_error)?;
    info!("Class {id} deleted");
    Ok(())
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
        get_classes,
        post_class,
        put_class,
        delete_class,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(json: &str) -> ClassSession {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_legacy_12_hour_time_is_normalized() {
        let c = load(r#"{"id": 1, "name": "Lighting", "instructor": "Dr. Noor", "date": "2025-06-10", "time": "9:00 AM - 12:30 PM", "students": 15, "maxStudents": 20}"#);
        assert_eq!(c.time, "09:00-12:30");
        assert_eq!(c.time_range(), Some(("09:00", "12:30")));
        assert_eq!(c.max_students, 20);
    }

    #[test]
    fn test_start_end_pair_is_folded_into_time() {
        let c = load(r#"{"id": "3", "name": "Audio", "instructor": "A", "studio": "audio-recording", "dayOfWeek": 2, "startTime": "2pm", "endTime": "4pm"}"#);
        assert_eq!(c.id, 3);
        assert_eq!(c.time, "14:00-16:00");
        assert_eq!(c.day_of_week, Some(2));
        assert_eq!(c.weekday(), Some(2));
    }

    #[test]
    fn test_malformed_time_passes_through() {
        let c = load(r#"{"id": 2, "name": "X", "instructor": "Y", "date": "2025-06-10", "time": "morning-noon"}"#);
        assert_eq!(c.time, "morning-noon");
        let c = load(r#"{"id": 2, "name": "X", "instructor": "Y", "date": "2025-06-10", "time": "all day"}"#);
        assert_eq!(c.time, "all day");
        assert_eq!(c.time_range(), None);
    }

    #[test]
    fn test_weekday_from_date() {
        // 2025-06-10 is a Tuesday
        let c = load(r#"{"id": 1, "name": "X", "instructor": "Y", "date": "2025-06-10", "time": "09:00-10:00"}"#);
        assert_eq!(c.weekday(), Some(2));
    }

    #[test]
    fn test_new_class() {
        let posted = PostedClass {
            name: "Editing".into(),
            instructor: "Ms. Lee".into(),
            date: Some("2025-06-11".into()),
            start_time: "1 pm".into(),
            end_time: "3:30pm".into(),
            max_students: None,
            studio: Some("".into()),
            day_of_week: None,
        };
        let class = new_class(5, posted);
        assert_eq!(class.id, 5);
        assert_eq!(class.time, "13:00-15:30");
        assert_eq!(class.max_students, DEFAULT_MAX_STUDENTS);
        assert_eq!(class.students, 0);
        assert_eq!(class.studio, None);
    }

    #[test]
    fn test_partial_update() {
        let mut class = load(r#"{"id": 1, "name": "X", "instructor": "Y", "date": "2025-06-10", "time": "09:00-10:00", "maxStudents": 12}"#);
        let update = ClassUpdate {
            end_time: Some("11am".into()),
            instructor: Some("Z".into()),
            ..Default::default()
        };
        assert_eq!(update.changed_fields(), vec!["instructor", "end_time"]);
        update.apply_to(&mut class);
        assert_eq!(class.time, "09:00-11:00");
        assert_eq!(class.instructor, "Z");
        assert_eq!(class.name, "X");
        assert_eq!(class.max_students, 12);
    }
}
