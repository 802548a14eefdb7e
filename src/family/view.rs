use chrono::NaiveDate;
use serde::Serialize;

use super::person::{Person, PersonId};
use super::render::{DisplayNode, Renderer, Selection};
use super::tree::FamilyTree;

pub const NO_MEMBERS_MESSAGE: &str = "No family members yet";
pub const RECENT_LIMIT: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecentEntry {
    pub id: PersonId,
    pub name: String,
    pub initials: String,
    pub added: String,
}

/// Everything the family page shows for one load of the people list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FamilyView {
    pub members: usize,
    /// People without a date of death.
    pub living: usize,
    /// People with a marriage date.
    pub married: usize,
    pub empty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub roots: Vec<DisplayNode>,
    pub recent: Vec<RecentEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<DisplayNode>,
}

impl FamilyView {
    pub fn build(
        people: &[Person],
        selection: Selection,
        today: NaiveDate,
        date_format: &str,
    ) -> Self {
        let renderer = Renderer::new(FamilyTree::new(people), today).with_date_format(date_format);

        let mut newest: Vec<&Person> = people.iter().collect();
        newest.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let recent = newest
            .into_iter()
            .take(RECENT_LIMIT)
            .map(|person| RecentEntry {
                id: person.id,
                name: person.full_name(),
                initials: person.initials(),
                added: renderer.format_date(person.created_at.date_naive()),
            })
            .collect();

        let selected = selection
            .selected()
            .and_then(|id| renderer.tree().get(id))
            .map(|person| renderer.render(person, 0));

        FamilyView {
            members: people.len(),
            living: people.iter().filter(|p| p.date_of_death.is_none()).count(),
            married: people.iter().filter(|p| p.marriage_date.is_some()).count(),
            empty: people.is_empty(),
            message: people.is_empty().then(|| NO_MEMBERS_MESSAGE.to_string()),
            roots: renderer.render_forest(),
            recent,
            selected,
        }
    }
}
