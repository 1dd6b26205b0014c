use std::fmt::Debug;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use crate::record::RecordId;
use crate::store::{CollectionKey, Repository};

// Status enums are stored as lowercase text. Reading is case-insensitive and
// an unknown value falls back to the default status.
macro_rules! impl_status_text {
    ($type:ident, $default:ident, $($variant:ident => $text:literal),+) => {
        impl $type {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($type::$variant => $text,)+
                }
            }
            pub fn from_text(s: &str) -> Option<Self> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($text) { return Some($type::$variant); }
                )+
                None
            }
        }
        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
        impl Serialize for $type {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
        impl<'de> serde::Deserialize<'de> for $type {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = crate::record::lenient_text(deserializer)?.unwrap_or_default();
                Ok($type::from_text(&text).unwrap_or_else(|| {
                    warn!("Unknown {} '{text}', reading it as {}", stringify!($type), $type::$default);
                    $type::$default
                }))
            }
        }
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReservationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}
impl_status_text!(ReservationStatus, Pending, Pending => "pending", Approved => "approved", Rejected => "rejected");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BorrowStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Returned,
}
impl_status_text!(BorrowStatus, Pending, Pending => "pending", Approved => "approved", Rejected => "rejected", Returned => "returned");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReservationAction {
    Approve,
    Reject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BorrowAction {
    Approve,
    Reject,
    Return,
}

pub trait StatusMachine: Copy + PartialEq + Debug {
    type Action: Copy + Debug;
    /// Target status, `None` when the action is not defined from this status.
    fn next(self, action: Self::Action) -> Option<Self>;
}

impl StatusMachine for ReservationStatus {
    type Action = ReservationAction;
    fn next(self, action: ReservationAction) -> Option<Self> {
        match (self, action) {
            (ReservationStatus::Pending, ReservationAction::Approve) => Some(ReservationStatus::Approved),
            (ReservationStatus::Pending, ReservationAction::Reject) => Some(ReservationStatus::Rejected),
            _ => None,
        }
    }
}

impl StatusMachine for BorrowStatus {
    type Action = BorrowAction;
    fn next(self, action: BorrowAction) -> Option<Self> {
        match (self, action) {
            (BorrowStatus::Pending, BorrowAction::Approve) => Some(BorrowStatus::Approved),
            (BorrowStatus::Pending, BorrowAction::Reject) => Some(BorrowStatus::Rejected),
            (BorrowStatus::Approved, BorrowAction::Return) => Some(BorrowStatus::Returned),
            _ => None,
        }
    }
}

/// A record whose status moves through a [`StatusMachine`].
pub trait Tracked {
    type Status: StatusMachine;
    fn id(&self) -> &RecordId;
    fn status(&self) -> Self::Status;
    fn set_status(&mut self, status: Self::Status);
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Transition<S> {
    Applied { from: S, to: S },
    /// The action is not defined from the current status, nothing was written.
    Unchanged { status: S },
    NotFound,
}

pub fn apply<T: Tracked>(records: &mut [T], id: &str, action: <T::Status as StatusMachine>::Action) -> Transition<T::Status> {
    let Some(rec) = records.iter_mut().find(|r| r.id().matches(id)) else {
        return Transition::NotFound;
    };
    let from = rec.status();
    match from.next(action) {
        Some(to) => {
            rec.set_status(to);
            Transition::Applied { from, to }
        }
        None => Transition::Unchanged { status: from },
    }
}

/// Removes every record with the id, returns whether anything was removed.
pub fn remove<T: Tracked>(records: &mut Vec<T>, id: &str) -> bool {
    let before = records.len();
    records.retain(|r| !r.id().matches(id));
    records.len() < before
}

/// Loads the collection, applies the action and persists the collection when the status changed.
pub async fn transition<T>(repo: &Repository, key: CollectionKey, id: &str, action: <T::Status as StatusMachine>::Action) -> anyhow::Result<Transition<T::Status>>
where
    T: Tracked + Serialize + DeserializeOwned,
{
    let mut coll = repo.load::<T>(key).await;
    let outcome = apply(&mut coll.records, id, action);
    match &outcome {
        Transition::Applied { from, to } => {
            repo.save(key, &mut coll).await?;
            info!("{key} {id}: {action:?} {from:?} -> {to:?}");
        }
        Transition::Unchanged { status } => info!("{key} {id}: {action:?} not allowed from {status:?}"),
        Transition::NotFound => info!("{key} {id}: {action:?} record not found"),
    }
    Ok(outcome)
}

pub async fn delete<T>(repo: &Repository, key: CollectionKey, id: &str) -> anyhow::Result<bool>
where
    T: Tracked + Serialize + DeserializeOwned,
{
    let mut coll = repo.load::<T>(key).await;
    if !remove(&mut coll.records, id) {
        info!("{key} {id}: delete, record not found");
        return Ok(false);
    }
    repo.save(key, &mut coll).await?;
    info!("{key} {id}: deleted");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Rec {
        id: RecordId,
        status: BorrowStatus,
    }
    impl Tracked for Rec {
        type Status = BorrowStatus;
        fn id(&self) -> &RecordId {
            &self.id
        }
        fn status(&self) -> BorrowStatus {
            self.status
        }
        fn set_status(&mut self, status: BorrowStatus) {
            self.status = status;
        }
    }
    fn rec(id: &str, status: BorrowStatus) -> Rec {
        Rec { id: RecordId(id.to_string()), status }
    }

    #[test]
    fn test_reservation_machine() {
        use ReservationAction::*;
        use ReservationStatus::*;
        assert_eq!(Pending.next(Approve), Some(Approved));
        assert_eq!(Pending.next(Reject), Some(Rejected));
        for status in [Approved, Rejected] {
            assert_eq!(status.next(Approve), None);
            assert_eq!(status.next(Reject), None);
        }
    }

    #[test]
    fn test_borrow_machine() {
        use BorrowAction::*;
        use BorrowStatus::*;
        assert_eq!(Pending.next(Approve), Some(Approved));
        assert_eq!(Pending.next(Reject), Some(Rejected));
        assert_eq!(Pending.next(Return), None);
        assert_eq!(Approved.next(Return), Some(Returned));
        assert_eq!(Approved.next(Approve), None);
        assert_eq!(Rejected.next(Return), None);
        assert_eq!(Returned.next(Approve), None);
    }

    #[test]
    fn test_approve_twice_keeps_approved() {
        let mut recs = vec![rec("1", BorrowStatus::Pending)];
        assert_eq!(apply(&mut recs, "1", BorrowAction::Approve),
                   Transition::Applied { from: BorrowStatus::Pending, to: BorrowStatus::Approved });
        assert_eq!(apply(&mut recs, "1", BorrowAction::Approve),
                   Transition::Unchanged { status: BorrowStatus::Approved });
        assert_eq!(recs[0].status, BorrowStatus::Approved);
    }

    #[test]
    fn test_return_after_reject_is_refused() {
        let mut recs = vec![rec("7", BorrowStatus::Pending)];
        apply(&mut recs, "7", BorrowAction::Reject);
        assert_eq!(apply(&mut recs, "7", BorrowAction::Return),
                   Transition::Unchanged { status: BorrowStatus::Rejected });
        assert_eq!(recs[0].status, BorrowStatus::Rejected);
    }

    #[test]
    fn test_unknown_id() {
        let mut recs = vec![rec("1", BorrowStatus::Pending)];
        assert_eq!(apply(&mut recs, "2", BorrowAction::Approve), Transition::NotFound);
        assert!(!remove(&mut recs, "2"));
        assert_eq!(recs.len(), 1);
        assert!(remove(&mut recs, "1"));
        assert!(recs.is_empty());
    }

    #[test]
    fn test_status_text() {
        let s: ReservationStatus = serde_json::from_str(r#""Pending""#).unwrap();
        assert_eq!(s, ReservationStatus::Pending);
        let s: BorrowStatus = serde_json::from_str(r#""RETURNED""#).unwrap();
        assert_eq!(s, BorrowStatus::Returned);
        let s: ReservationStatus = serde_json::from_str(r#""on hold""#).unwrap();
        assert_eq!(s, ReservationStatus::Pending);
        assert_eq!(serde_json::to_string(&ReservationStatus::Approved).unwrap(), r#""approved""#);
    }
}
