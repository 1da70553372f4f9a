use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::domain::{
    ApplicantRef, Application, ApplicationId, ApplicationStatus, IntakeSource, ReviewMessageRef,
};

/// In-process home of every application for the lifetime of the process.
///
/// All reads and writes go through one lock. Id assignment happens under the same lock, so ids
/// stay unique and monotonic even when submissions race.
#[derive(Debug, Default)]
pub struct ApplicationStore {
    inner: Mutex<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    last_id: u64,
    records: BTreeMap<ApplicationId, Application>,
    messages: HashMap<ReviewMessageRef, ApplicationId>,
}

impl ApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // Closures run under this lock never leave a record half-written, so a poisoned
        // guard still holds consistent data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(
        &self,
        kind: impl Into<String>,
        applicant: Option<ApplicantRef>,
        content: impl Into<String>,
        source: IntakeSource,
        created_at: DateTime<Utc>,
    ) -> Application {
        let mut inner = self.lock();
        inner.last_id += 1;
        let application = Application {
            id: ApplicationId(inner.last_id),
            kind: kind.into(),
            applicant,
            content: content.into(),
            source,
            created_at,
            status: ApplicationStatus::Pending,
            votes: Vec::new(),
            decided_by: None,
            decided_at: None,
            finalized_by: None,
            review_message: None,
        };
        inner.records.insert(application.id, application.clone());
        application
    }

    pub fn get(&self, id: ApplicationId) -> Option<Application> {
        self.lock().records.get(&id).cloned()
    }

    pub fn contains(&self, id: ApplicationId) -> bool {
        self.lock().records.contains_key(&id)
    }

    /// Submission order: `created_at` ascending, ids break ties.
    pub fn list_by_applicant(&self, applicant: &ApplicantRef) -> Vec<Application> {
        let mut matches: Vec<Application> = self
            .lock()
            .records
            .values()
            .filter(|record| record.applicant.as_ref() == Some(applicant))
            .cloned()
            .collect();
        matches.sort_by_key(|record| (record.created_at, record.id));
        matches
    }

    pub fn all_pending(&self) -> Vec<Application> {
        self.lock()
            .records
            .values()
            .filter(|record| record.is_pending())
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Application> {
        self.lock().records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `mutate` with exclusive access to one record. Returns `None` for unknown ids.
    pub fn update<T>(
        &self,
        id: ApplicationId,
        mutate: impl FnOnce(&mut Application) -> T,
    ) -> Option<T> {
        let mut inner = self.lock();
        inner.records.get_mut(&id).map(mutate)
    }

    /// Binds the review-channel message to an application so reactions and replies can find it.
    /// A message is bound to at most one application; re-linking moves it.
    pub fn link_message(&self, id: ApplicationId, message: ReviewMessageRef) -> bool {
        let mut inner = self.lock();
        let Some(record) = inner.records.get_mut(&id) else {
            return false;
        };
        let previous = record.review_message.replace(message.clone());
        if let Some(previous) = previous {
            inner.messages.remove(&previous);
        }
        if let Some(stale) = inner.messages.insert(message, id) {
            if stale != id {
                if let Some(other) = inner.records.get_mut(&stale) {
                    other.review_message = None;
                }
            }
        }
        true
    }

    pub fn resolve_message(&self, message: &ReviewMessageRef) -> Option<ApplicationId> {
        self.lock().messages.get(message).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn applicant(name: &str) -> Option<ApplicantRef> {
        Some(ApplicantRef(name.to_string()))
    }

    #[test]
    fn create_assigns_sequential_ids_and_pending_status() {
        let store = ApplicationStore::new();
        let first = store.create("tester", applicant("ana"), "hi", IntakeSource::Command, at(1));
        let second = store.create("staff", None, "hello", IntakeSource::Spreadsheet, at(2));

        assert_eq!(first.id, ApplicationId(1));
        assert_eq!(second.id, ApplicationId(2));
        assert_eq!(first.status, ApplicationStatus::Pending);
        assert!(second.applicant.is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn concurrent_creates_never_share_an_id() {
        let store = Arc::new(ApplicationStore::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|n| {
                            store
                                .create(
                                    "tester",
                                    applicant(&format!("w{worker}-{n}")),
                                    "",
                                    IntakeSource::Command,
                                    at(0),
                                )
                                .id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<ApplicationId> = handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("worker finished"))
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 400);
    }

    #[test]
    fn list_by_applicant_orders_by_submission_time() {
        let store = ApplicationStore::new();
        store.create("staff", applicant("ana"), "late", IntakeSource::Spreadsheet, at(9));
        store.create("tester", applicant("bo"), "other", IntakeSource::Command, at(3));
        store.create("tester", applicant("ana"), "early", IntakeSource::Command, at(4));

        let history = store.list_by_applicant(&ApplicantRef("ana".to_string()));
        let contents: Vec<_> = history.iter().map(|app| app.content.as_str()).collect();
        assert_eq!(contents, vec!["early", "late"]);
    }

    #[test]
    fn all_pending_skips_decided_records() {
        let store = ApplicationStore::new();
        let open = store.create("tester", None, "", IntakeSource::Command, at(1));
        let closed = store.create("tester", None, "", IntakeSource::Command, at(1));
        store
            .update(closed.id, |app| app.status = ApplicationStatus::Denied)
            .expect("record exists");

        let pending: Vec<_> = store.all_pending().into_iter().map(|app| app.id).collect();
        assert_eq!(pending, vec![open.id]);
    }

    #[test]
    fn update_returns_none_for_unknown_ids() {
        let store = ApplicationStore::new();
        assert!(store.update(ApplicationId(7), |_| ()).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn relinking_a_message_moves_it_between_applications() {
        let store = ApplicationStore::new();
        let first = store.create("tester", None, "", IntakeSource::Command, at(1));
        let second = store.create("tester", None, "", IntakeSource::Command, at(1));
        let message = ReviewMessageRef("msg-1".to_string());

        assert!(store.link_message(first.id, message.clone()));
        assert!(store.link_message(second.id, message.clone()));

        assert_eq!(store.resolve_message(&message), Some(second.id));
        assert!(store.get(first.id).expect("first").review_message.is_none());
        assert!(!store.link_message(ApplicationId(99), message));
    }
}
