use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;

use super::form::{PersonDraft, RelationCandidates, ValidationError, relation_candidates};
use super::person::{Person, PersonId};
use super::render::Selection;
use super::view::FamilyView;
use crate::data::pictures::picture_type;
use crate::data::store::FamilyStore;
use crate::error::AppError;

/// Result of a successful save: the stored person and the list reloaded
/// after the write.
///
/// The write stands even when the reload fails. `people` is then `None` and
/// `reload_error` says why; the client should refresh, not resubmit.
#[derive(Debug, Serialize)]
pub struct SaveOutcome {
    pub person: Person,
    pub people: Option<Vec<Person>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_error: Option<String>,
}

/// The family page operations for one store.
///
/// Every mutation is followed by a full reload of the people list; nothing
/// is patched in place.
pub struct Dashboard<'a, S> {
    store: &'a S,
    date_format: &'a str,
}

impl<'a, S: FamilyStore> Dashboard<'a, S> {
    pub fn new(store: &'a S, date_format: &'a str) -> Self {
        Dashboard { store, date_format }
    }

    pub async fn authenticate(&self, token: Option<&str>) -> Result<String, AppError> {
        let token = token.map(str::trim).unwrap_or_default();
        self.store
            .current_user(token)
            .await
            .map_err(AppError::Fetch)?
            .ok_or(AppError::Unauthenticated)
    }

    pub async fn load(&self, owner: &str) -> Result<Vec<Person>, AppError> {
        let people = self
            .store
            .list_people(owner)
            .await
            .map_err(AppError::Fetch)?;
        debug!("Loaded {} people for {owner}", people.len());
        Ok(people)
    }

    pub async fn view(
        &self,
        owner: &str,
        selection: Selection,
        today: NaiveDate,
    ) -> Result<FamilyView, AppError> {
        let people = self.load(owner).await?;
        Ok(FamilyView::build(&people, selection, today, self.date_format))
    }

    pub async fn candidates(
        &self,
        owner: &str,
        editing: Option<PersonId>,
        parent_id: Option<PersonId>,
    ) -> Result<RelationCandidates, AppError> {
        let people = self.load(owner).await?;
        Ok(relation_candidates(&people, editing, parent_id))
    }

    /// Insert (`editing` is `None`) or update a person, then reload.
    pub async fn save(
        &self,
        owner: &str,
        draft: &PersonDraft,
        editing: Option<PersonId>,
    ) -> Result<SaveOutcome, AppError> {
        let record = draft.validate(editing)?;

        let person = match editing {
            Some(id) => self.store.update_person(owner, id, &record).await,
            None => self.store.insert_person(owner, &record).await,
        }
        .map_err(AppError::Mutation)?;
        info!("Saved person {} for {owner}", person.id);

        match self.load(owner).await {
            Ok(people) => Ok(SaveOutcome {
                person,
                people: Some(people),
                reload_error: None,
            }),
            Err(e) => {
                warn!("Saved person {} but reload failed: {e}", person.id);
                Ok(SaveOutcome {
                    person,
                    people: None,
                    reload_error: Some(e.to_string()),
                })
            }
        }
    }

    pub async fn upload_picture(
        &self,
        owner: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String, AppError> {
        if picture_type(file_name).is_none() {
            return Err(ValidationError::UnsupportedPicture(file_name.to_string()).into());
        }
        let url = self
            .store
            .upload_image(owner, file_name, bytes)
            .await
            .map_err(|e| AppError::Mutation(e.context("Failed to upload profile picture")))?;
        info!("Uploaded picture for {owner}: {url}");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::render::DEFAULT_DATE_FORMAT;
    use crate::family::testing::MemoryStore;

    fn draft(first_name: &str, parent_id: Option<PersonId>) -> PersonDraft {
        PersonDraft {
            first_name: first_name.to_string(),
            last_name: "Test".to_string(),
            parent_id,
            ..Default::default()
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn save_reloads_after_mutation() {
        let store = MemoryStore::default();
        let dashboard = Dashboard::new(&store, DEFAULT_DATE_FORMAT);

        let first = dashboard.save("alice", &draft("A", None), None).await.unwrap();
        assert_eq!(first.people.map(|p| p.len()), Some(1));
        let second = dashboard
            .save("alice", &draft("B", Some(first.person.id)), None)
            .await
            .unwrap();
        assert_eq!(second.people.map(|p| p.len()), Some(2));
        assert_eq!(store.list_calls(), 2);

        let edited = dashboard
            .save("alice", &draft("B2", Some(first.person.id)), Some(second.person.id))
            .await
            .unwrap();
        assert_eq!(edited.person.first_name, "B2");
        assert_eq!(edited.people.map(|p| p.len()), Some(2));
        assert_eq!(edited.reload_error, None);

        let view = dashboard
            .view("alice", Selection::default(), today())
            .await
            .unwrap();
        assert_eq!(view.roots.len(), 1);
        assert_eq!(view.roots[0].children[0].name, "B2 Test");
    }

    #[tokio::test]
    async fn failed_mutation_skips_reload() {
        let store = MemoryStore::default();
        store.fail_writes(true);
        let dashboard = Dashboard::new(&store, DEFAULT_DATE_FORMAT);

        let err = dashboard
            .save("alice", &draft("A", None), None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Mutation(_)));
        assert!(err.retryable());
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn failed_reload_still_reports_the_save() {
        let store = MemoryStore::default();
        store.fail_reads(true);
        let dashboard = Dashboard::new(&store, DEFAULT_DATE_FORMAT);

        let outcome = dashboard
            .save("alice", &draft("A", None), None)
            .await
            .unwrap();

        assert_eq!(outcome.person.first_name, "A");
        assert!(outcome.people.is_none());
        assert!(
            outcome
                .reload_error
                .unwrap()
                .contains("memory store rejects reads")
        );

        store.fail_reads(false);
        assert_eq!(store.list_people("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_draft_never_reaches_store() {
        let store = MemoryStore::default();
        let dashboard = Dashboard::new(&store, DEFAULT_DATE_FORMAT);

        let err = dashboard
            .save("alice", &draft("  ", None), None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Invalid(_)));
        assert!(store.list_people("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_is_retryable() {
        let store = MemoryStore::default();
        store.fail_reads(true);
        let dashboard = Dashboard::new(&store, DEFAULT_DATE_FORMAT);

        let err = dashboard
            .view("alice", Selection::default(), today())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));

        store.fail_reads(false);
        let view = dashboard
            .view("alice", Selection::default(), today())
            .await
            .unwrap();
        assert!(view.empty);
    }

    #[tokio::test]
    async fn authentication() {
        let store = MemoryStore::default();
        let dashboard = Dashboard::new(&store, DEFAULT_DATE_FORMAT);

        assert_eq!(
            dashboard.authenticate(Some(" alice-token ")).await.unwrap(),
            "alice"
        );
        assert!(matches!(
            dashboard.authenticate(None).await,
            Err(AppError::Unauthenticated)
        ));
        assert!(matches!(
            dashboard.authenticate(Some("wrong")).await,
            Err(AppError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn upload_failure_is_a_mutation_error() {
        let store = MemoryStore::default();
        let dashboard = Dashboard::new(&store, DEFAULT_DATE_FORMAT);
        assert_eq!(
            dashboard.upload_picture("alice", "me.png", b"x").await.unwrap(),
            "memory://alice/me.png"
        );

        store.fail_writes(true);
        let err = dashboard
            .upload_picture("alice", "me.png", b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Mutation(_)));
        assert!(err.to_string().starts_with("Failed to upload profile picture"));
    }

    #[tokio::test]
    async fn only_raster_pictures_are_uploaded() {
        let store = MemoryStore::default();
        let dashboard = Dashboard::new(&store, DEFAULT_DATE_FORMAT);

        for name in ["me.svg", "me.html", "me"] {
            let err = dashboard
                .upload_picture("alice", name, b"<svg/>")
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                AppError::Invalid(ValidationError::UnsupportedPicture(_))
            ));
            assert!(!err.retryable());
        }
    }
}
