use anyhow::Context;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::family::person::{Person, PersonRecord, occasions_to_blob, parse_occasions};

impl From<crate::entity::people::Model> for Person {
    fn from(m: crate::entity::people::Model) -> Self {
        Person {
            id: m.id,
            owner_id: m.owner_id,
            first_name: m.first_name,
            last_name: m.last_name,
            date_of_birth: m.date_of_birth,
            date_of_death: m.date_of_death,
            marriage_date: m.marriage_date,
            profile_picture_url: m.profile_picture_url,
            parent_id: m.parent_id,
            spouse_id: m.spouse_id,
            special_occasions: parse_occasions(&m.special_occasions),
            created_at: m.created_at,
        }
    }
}

fn apply_record(person: &mut crate::entity::people::ActiveModel, record: &PersonRecord) {
    person.first_name = Set(record.first_name.clone());
    person.last_name = Set(record.last_name.clone());
    person.date_of_birth = Set(record.date_of_birth);
    person.date_of_death = Set(record.date_of_death);
    person.marriage_date = Set(record.marriage_date);
    person.profile_picture_url = Set(record.profile_picture_url.clone());
    person.parent_id = Set(record.parent_id);
    person.spouse_id = Set(record.spouse_id);
    person.special_occasions = Set(occasions_to_blob(&record.special_occasions));
}

/// Every person owned by `owner_id`, newest first.
pub async fn people_of(db: &DatabaseConnection, owner_id: &str) -> anyhow::Result<Vec<Person>> {
    use crate::entity::people;

    let rows = people::Entity::find()
        .filter(people::Column::OwnerId.eq(owner_id))
        .order_by_desc(people::Column::CreatedAt)
        .order_by_desc(people::Column::Id)
        .all(db)
        .await?;

    Ok(rows.into_iter().map(Person::from).collect())
}

pub async fn add_person(
    db: &DatabaseConnection,
    owner_id: &str,
    record: &PersonRecord,
) -> anyhow::Result<Person> {
    use crate::entity::people;

    let mut person = people::ActiveModel {
        owner_id: Set(owner_id.to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    apply_record(&mut person, record);

    let inserted = person
        .insert(db)
        .await
        .context("failed to insert person")?;
    Ok(inserted.into())
}

pub async fn change_person(
    db: &DatabaseConnection,
    owner_id: &str,
    id: i32,
    record: &PersonRecord,
) -> anyhow::Result<Person> {
    use crate::entity::people;

    let existing = people::Entity::find_by_id(id)
        .filter(people::Column::OwnerId.eq(owner_id))
        .one(db)
        .await?
        .with_context(|| format!("no person with id {id}"))?;

    let mut person: people::ActiveModel = existing.into();
    apply_record(&mut person, record);

    let updated = person
        .update(db)
        .await
        .context("failed to update person")?;
    Ok(updated.into())
}

pub async fn account_for_token(
    db: &DatabaseConnection,
    token: &str,
) -> anyhow::Result<Option<String>> {
    use crate::entity::accounts;

    let account = accounts::Entity::find()
        .filter(accounts::Column::Token.eq(token))
        .one(db)
        .await?;
    Ok(account.map(|a| a.id))
}

/// Unset every stored token. Accounts keep their rows, and so their people,
/// but cannot sign in until a token is set again.
pub async fn revoke_tokens<C: ConnectionTrait>(db: &C) -> anyhow::Result<u64> {
    use crate::entity::accounts;
    use sea_orm::sea_query::Expr;

    let result = accounts::Entity::update_many()
        .col_expr(accounts::Column::Token, Expr::value(Option::<String>::None))
        .exec(db)
        .await
        .context("failed to revoke account tokens")?;
    Ok(result.rows_affected)
}

/// Insert the account, or replace its token when it already exists.
pub async fn upsert_account<C: ConnectionTrait>(db: &C, id: &str, token: &str) -> anyhow::Result<()> {
    use crate::entity::accounts;
    use sea_orm::sea_query::OnConflict;

    anyhow::ensure!(!token.is_empty(), "account {id} has an empty token");

    let account = accounts::ActiveModel {
        id: Set(id.to_string()),
        token: Set(Some(token.to_string())),
    };

    accounts::Entity::insert(account)
        .on_conflict(
            OnConflict::column(accounts::Column::Id)
                .update_column(accounts::Column::Token)
                .to_owned(),
        )
        .exec_without_returning(db)
        .await
        .with_context(|| format!("failed to upsert account {id}"))?;
    Ok(())
}
