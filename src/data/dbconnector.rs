use anyhow::Context;
use log::{debug, info};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Schema, Statement,
    TransactionTrait,
};

use crate::data::configuration::Configuration;
use crate::data::pictures::PictureStorage;
use crate::data::store::FamilyStore;
use crate::entity::helpers;
use crate::family::person::{Person, PersonId, PersonRecord, UserId};

#[allow(async_fn_in_trait)]
pub trait KinDBConnection {
    async fn connect(&mut self) -> Result<(), anyhow::Error>;
    async fn check(&self) -> Result<(), anyhow::Error>;
    async fn close(&self) -> Result<(), anyhow::Error>;
}

/// SQLite-backed store. Created once at startup and shared by reference.
pub struct SQLConnector {
    url: String,
    pictures: PictureStorage,
    database_connection: Option<DatabaseConnection>,
}

impl SQLConnector {
    pub fn new(path: &str, pictures: PictureStorage) -> Self {
        Self::with_url(&format!("sqlite://{path}/db.sqlite?mode=rwc"), pictures)
    }

    pub fn with_url(url: &str, pictures: PictureStorage) -> Self {
        SQLConnector {
            url: url.to_string(),
            pictures,
            database_connection: None,
        }
    }

    pub fn pictures(&self) -> &PictureStorage {
        &self.pictures
    }

    fn db(&self) -> anyhow::Result<&DatabaseConnection> {
        self.database_connection
            .as_ref()
            .context("database is not connected")
    }

    pub async fn is_initialized(&self) -> anyhow::Result<bool> {
        let row = self
            .db()?
            .query_one(Statement::from_string(
                DbBackend::Sqlite,
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'people'",
            ))
            .await?;
        Ok(row.is_some())
    }

    /// Create the tables. Safe to call on a database that already has them.
    pub async fn initialize(&self, config: &Configuration) -> anyhow::Result<()> {
        use crate::entity::{accounts, people};

        let db = self.db()?;
        let backend = db.get_database_backend();
        let schema = Schema::new(backend);

        let mut accounts_table = schema.create_table_from_entity(accounts::Entity);
        accounts_table.if_not_exists();
        db.execute(backend.build(&accounts_table))
            .await
            .context("failed to create accounts table")?;

        let mut people_table = schema.create_table_from_entity(people::Entity);
        people_table.if_not_exists();
        db.execute(backend.build(&people_table))
            .await
            .context("failed to create people table")?;

        info!("Created database schema");
        self.sync_accounts(config).await
    }

    /// Make the accounts table match the configured accounts and tokens.
    ///
    /// Tokens are cleared before the configured ones are written, all in one
    /// transaction, so accounts dropped from the configuration stop
    /// authenticating and tokens may move between accounts.
    pub async fn sync_accounts(&self, config: &Configuration) -> anyhow::Result<()> {
        let txn = self.db()?.begin().await?;
        if let Err(e) = write_accounts(&txn, config).await {
            txn.rollback().await?;
            return Err(e);
        }
        txn.commit().await.context("failed to commit account sync")?;
        info!("Synced {} accounts", config.accounts.len());
        Ok(())
    }
}

async fn write_accounts<C: ConnectionTrait>(db: &C, config: &Configuration) -> anyhow::Result<()> {
    let revoked = helpers::revoke_tokens(db).await?;
    debug!("Cleared {revoked} account tokens");
    for (id, account) in &config.accounts {
        helpers::upsert_account(db, id, &account.token).await?;
        debug!("Synced account {id}");
    }
    Ok(())
}

impl KinDBConnection for SQLConnector {
    async fn connect(&mut self) -> Result<(), anyhow::Error> {
        let mut options = ConnectOptions::new(self.url.clone());
        // Every pooled connection would get its own in-memory database.
        if self.url.contains(":memory:") {
            options.max_connections(1).min_connections(1);
        }
        options.sqlx_logging_level(log::LevelFilter::Debug);
        let db = Database::connect(options).await?;

        self.database_connection = Some(db);
        Ok(())
    }
    async fn check(&self) -> Result<(), anyhow::Error> {
        if let Some(ref db) = self.database_connection {
            db.ping().await?;
        }
        Ok(())
    }
    async fn close(&self) -> Result<(), anyhow::Error> {
        if let Some(ref db) = self.database_connection {
            let db = db.clone();
            db.close().await?;
        }
        Ok(())
    }
}

impl FamilyStore for SQLConnector {
    async fn list_people(&self, owner: &str) -> anyhow::Result<Vec<Person>> {
        helpers::people_of(self.db()?, owner).await
    }

    async fn insert_person(&self, owner: &str, record: &PersonRecord) -> anyhow::Result<Person> {
        helpers::add_person(self.db()?, owner, record).await
    }

    async fn update_person(
        &self,
        owner: &str,
        id: PersonId,
        record: &PersonRecord,
    ) -> anyhow::Result<Person> {
        helpers::change_person(self.db()?, owner, id, record).await
    }

    async fn upload_image(
        &self,
        owner: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> anyhow::Result<String> {
        self.pictures.store(owner, file_name, bytes).await
    }

    async fn current_user(&self, token: &str) -> anyhow::Result<Option<UserId>> {
        if token.is_empty() {
            return Ok(None);
        }
        helpers::account_for_token(self.db()?, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::testing::configuration;
    use chrono::NaiveDate;

    async fn connected(dir: &std::path::Path) -> SQLConnector {
        let mut store = SQLConnector::with_url(
            "sqlite::memory:",
            PictureStorage::new(dir, "http://localhost:8080/pictures"),
        );
        store.connect().await.unwrap();
        store.check().await.unwrap();
        assert!(!store.is_initialized().await.unwrap());
        store.initialize(&configuration()).await.unwrap();
        assert!(store.is_initialized().await.unwrap());
        store
    }

    fn record(first_name: &str, parent_id: Option<PersonId>) -> PersonRecord {
        PersonRecord {
            first_name: first_name.to_string(),
            last_name: "Test".to_string(),
            parent_id,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn people_round_trip_per_owner() {
        let dir = tempfile::tempdir().unwrap();
        let store = connected(dir.path()).await;

        let mut parent = record("Parent", None);
        parent.date_of_birth = NaiveDate::from_ymd_opt(1950, 2, 3);
        parent.special_occasions = vec![crate::family::person::SpecialOccasion {
            name: "Retirement".to_string(),
            date: NaiveDate::from_ymd_opt(2015, 6, 30).unwrap(),
            description: None,
        }];
        let parent = store.insert_person("alice", &parent).await.unwrap();
        let child = store
            .insert_person("alice", &record("Child", Some(parent.id)))
            .await
            .unwrap();
        store
            .insert_person("bob", &record("Stranger", None))
            .await
            .unwrap();

        let people = store.list_people("alice").await.unwrap();
        assert_eq!(people.len(), 2);
        let loaded = people.iter().find(|p| p.id == parent.id).unwrap();
        assert_eq!(loaded.date_of_birth, NaiveDate::from_ymd_opt(1950, 2, 3));
        assert_eq!(loaded.special_occasions.len(), 1);
        assert_eq!(
            people.iter().find(|p| p.id == child.id).unwrap().parent_id,
            Some(parent.id)
        );

        let mut renamed = record("Renamed", Some(parent.id));
        renamed.spouse_id = Some(parent.id);
        let updated = store
            .update_person("alice", child.id, &renamed)
            .await
            .unwrap();
        assert_eq!(updated.first_name, "Renamed");
        assert_eq!(updated.created_at, child.created_at);

        assert!(
            store
                .update_person("bob", child.id, &renamed)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn tokens_resolve_to_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let store = connected(dir.path()).await;

        assert_eq!(
            store.current_user("alice-token").await.unwrap().as_deref(),
            Some("alice")
        );
        assert_eq!(store.current_user("nope").await.unwrap(), None);
        assert_eq!(store.current_user("").await.unwrap(), None);

        // Re-running initialization keeps the schema and updates tokens.
        let mut config = configuration();
        config.accounts.get_mut("alice").unwrap().token = "rotated".to_string();
        store.initialize(&config).await.unwrap();
        assert_eq!(store.current_user("alice-token").await.unwrap(), None);
        assert_eq!(
            store.current_user("rotated").await.unwrap().as_deref(),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn removed_account_stops_authenticating() {
        let dir = tempfile::tempdir().unwrap();
        let store = connected(dir.path()).await;
        store
            .insert_person("bob", &record("Kept", None))
            .await
            .unwrap();

        let mut config = configuration();
        config.accounts.remove("bob");
        store.sync_accounts(&config).await.unwrap();

        assert_eq!(store.current_user("bob-token").await.unwrap(), None);
        assert_eq!(
            store.current_user("alice-token").await.unwrap().as_deref(),
            Some("alice")
        );
        // Revoking sign-in leaves the account's people alone.
        assert_eq!(store.list_people("bob").await.unwrap().len(), 1);

        config = configuration();
        store.sync_accounts(&config).await.unwrap();
        assert_eq!(
            store.current_user("bob-token").await.unwrap().as_deref(),
            Some("bob")
        );
    }

    #[tokio::test]
    async fn tokens_can_swap_between_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let store = connected(dir.path()).await;

        let mut config = configuration();
        config.accounts.get_mut("alice").unwrap().token = "bob-token".to_string();
        config.accounts.get_mut("bob").unwrap().token = "alice-token".to_string();
        store.sync_accounts(&config).await.unwrap();

        assert_eq!(
            store.current_user("alice-token").await.unwrap().as_deref(),
            Some("bob")
        );
        assert_eq!(
            store.current_user("bob-token").await.unwrap().as_deref(),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn failed_sync_keeps_previous_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = connected(dir.path()).await;

        let mut config = configuration();
        config.accounts.get_mut("bob").unwrap().token = "alice-token".to_string();
        assert!(store.sync_accounts(&config).await.is_err());

        assert_eq!(
            store.current_user("alice-token").await.unwrap().as_deref(),
            Some("alice")
        );
        assert_eq!(
            store.current_user("bob-token").await.unwrap().as_deref(),
            Some("bob")
        );
    }

    #[tokio::test]
    async fn closed_store_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = connected(dir.path()).await;
        store.close().await.unwrap();
        assert!(store.list_people("alice").await.is_err());
        assert!(store.check().await.is_err());
    }

    #[tokio::test]
    async fn unconnected_store_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = SQLConnector::with_url("sqlite::memory:", PictureStorage::new(dir.path(), "x"));
        assert!(store.list_people("alice").await.is_err());
    }
}
