use crate::family::person::{Person, PersonId, PersonRecord, UserId};

/// The backend the family pages talk to: people records, picture uploads and
/// the session check. Reads and writes are single requests with no ordering
/// between them.
#[allow(async_fn_in_trait)]
pub trait FamilyStore {
    async fn list_people(&self, owner: &str) -> anyhow::Result<Vec<Person>>;
    async fn insert_person(&self, owner: &str, record: &PersonRecord) -> anyhow::Result<Person>;
    async fn update_person(
        &self,
        owner: &str,
        id: PersonId,
        record: &PersonRecord,
    ) -> anyhow::Result<Person>;
    async fn upload_image(&self, owner: &str, file_name: &str, bytes: &[u8])
    -> anyhow::Result<String>;
    async fn current_user(&self, token: &str) -> anyhow::Result<Option<UserId>>;
}
