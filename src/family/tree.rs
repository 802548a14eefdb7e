use std::collections::HashMap;

use super::person::{Person, PersonId};

/// Parent and spouse adjacency over a flat, unordered list of people.
///
/// Lookups never fail: an id that matches nobody yields an empty list or
/// `None`. Children keep the relative order of the input list.
#[derive(Debug)]
pub struct FamilyTree<'a> {
    people: &'a [Person],
    by_id: HashMap<PersonId, usize>,
    children: HashMap<PersonId, Vec<usize>>,
}

impl<'a> FamilyTree<'a> {
    pub fn new(people: &'a [Person]) -> Self {
        let mut by_id = HashMap::with_capacity(people.len());
        let mut children: HashMap<PersonId, Vec<usize>> = HashMap::new();
        for (index, person) in people.iter().enumerate() {
            by_id.entry(person.id).or_insert(index);
            if let Some(parent_id) = person.parent_id {
                children.entry(parent_id).or_default().push(index);
            }
        }
        FamilyTree {
            people,
            by_id,
            children,
        }
    }

    pub fn people(&self) -> &'a [Person] {
        self.people
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    pub fn get(&self, id: PersonId) -> Option<&'a Person> {
        self.by_id.get(&id).map(|&index| &self.people[index])
    }

    pub fn children_of(&self, parent_id: PersonId) -> Vec<&'a Person> {
        self.children
            .get(&parent_id)
            .map(|indexes| indexes.iter().map(|&i| &self.people[i]).collect())
            .unwrap_or_default()
    }

    pub fn spouse_of(&self, spouse_id: PersonId) -> Option<&'a Person> {
        self.get(spouse_id)
    }

    /// People with no parent, or whose parent is not in the list.
    pub fn roots(&self) -> Vec<&'a Person> {
        self.people
            .iter()
            .filter(|person| match person.parent_id {
                None => true,
                Some(parent_id) => !self.by_id.contains_key(&parent_id),
            })
            .collect()
    }
}
