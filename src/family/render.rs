use std::collections::{HashSet, VecDeque};
use std::fmt::Write;

use chrono::{Datelike, NaiveDate};
use log::warn;
use serde::{Deserialize, Serialize};

use super::person::{DATE_INPUT_FORMAT, Person, PersonId};
use super::tree::FamilyTree;

/// US short date, e.g. `6/1/2024`.
pub const DEFAULT_DATE_FORMAT: &str = "%-m/%-d/%Y";
pub const PLACEHOLDER_PICTURE: &str = "/placeholder.svg";
/// Deepest nesting below a top-level node. Keeps rendering, serializing and
/// dropping a pathological parent chain within a bounded stack.
pub const MAX_RENDER_DEPTH: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OccasionLine {
    pub name: String,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One rendered person with its derived fields and nested children.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DisplayNode {
    pub id: PersonId,
    pub name: String,
    pub initials: String,
    pub picture_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub born: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub died: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub married: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spouse: Option<String>,
    pub occasions: Vec<OccasionLine>,
    pub depth: usize,
    /// Set when this node sits on a parent cycle that was cut during traversal.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cycle: bool,
    /// Parent of this node when a chain deeper than [`MAX_RENDER_DEPTH`] was
    /// split here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continued_from: Option<PersonId>,
    pub children: Vec<DisplayNode>,
}

impl DisplayNode {
    /// Number of nodes in this subtree, itself included.
    pub fn count(&self) -> usize {
        1 + count_nodes(&self.children)
    }
}

pub fn count_nodes(nodes: &[DisplayNode]) -> usize {
    nodes.iter().map(DisplayNode::count).sum()
}

/// The person whose detail panel is open, if any.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    selected: Option<PersonId>,
}

impl Selection {
    pub fn new(selected: Option<PersonId>) -> Self {
        Selection { selected }
    }

    pub fn selected(&self) -> Option<PersonId> {
        self.selected
    }

    pub fn is_selected(&self, id: PersonId) -> bool {
        self.selected == Some(id)
    }

    /// Select `id`, or clear the selection when `id` is already selected.
    pub fn toggle(&mut self, id: PersonId) {
        self.selected = if self.is_selected(id) { None } else { Some(id) };
    }

    pub fn clear(&mut self) {
        self.selected = None;
    }
}

/// Whole calendar years between the birth year and the death year (or the
/// current year). The birthday itself is not taken into account, so the value
/// can be one too high early in the year.
pub fn age_label(birth: NaiveDate, death: Option<NaiveDate>, today: NaiveDate) -> String {
    let end = death.unwrap_or(today);
    let years = end.year() - birth.year();
    match death {
        Some(_) => format!("({years} years)"),
        None => format!("({years} years old)"),
    }
}

pub fn format_date(date: NaiveDate, date_format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", date.format(date_format)).is_err() {
        warn!("Invalid date format {date_format:?}, falling back to {DATE_INPUT_FORMAT}");
        return date.format(DATE_INPUT_FORMAT).to_string();
    }
    out
}

/// Builds the nested display forest from a [`FamilyTree`].
#[derive(Debug)]
pub struct Renderer<'a> {
    tree: FamilyTree<'a>,
    today: NaiveDate,
    date_format: String,
}

impl<'a> Renderer<'a> {
    pub fn new(tree: FamilyTree<'a>, today: NaiveDate) -> Self {
        Renderer {
            tree,
            today,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }

    pub fn with_date_format(mut self, date_format: impl Into<String>) -> Self {
        self.date_format = date_format.into();
        self
    }

    pub fn tree(&self) -> &FamilyTree<'a> {
        &self.tree
    }

    pub fn format_date(&self, date: NaiveDate) -> String {
        format_date(date, &self.date_format)
    }

    /// Render one person and everything below it, nested at most
    /// [`MAX_RENDER_DEPTH`] levels below `person`. Deeper descendants are
    /// left out; [`Renderer::render_forest`] shows them as continuations.
    pub fn render(&self, person: &Person, depth: usize) -> DisplayNode {
        let mut visited = HashSet::new();
        let mut overflow = VecDeque::new();
        self.render_node(person, depth, &mut visited, &mut overflow)
    }

    /// Render every root, then every person no root reaches. Those can only
    /// be members of a parent cycle and are returned as extra roots with
    /// `cycle` set, so each person shows up exactly once.
    ///
    /// Chains deeper than [`MAX_RENDER_DEPTH`] are split: the children below
    /// the limit start new top-level nodes with `continued_from` set.
    pub fn render_forest(&self) -> Vec<DisplayNode> {
        let mut visited = HashSet::with_capacity(self.tree.len());
        let mut overflow = VecDeque::new();
        let mut forest = Vec::new();

        for root in self.tree.roots() {
            forest.push(self.render_node(root, 0, &mut visited, &mut overflow));
            self.render_continuations(&mut forest, &mut visited, &mut overflow);
        }

        for person in self.tree.people() {
            if visited.contains(&person.id) {
                continue;
            }
            warn!(
                "Parent cycle detected at person {} ({})",
                person.id,
                person.full_name()
            );
            let mut node = self.render_node(person, 0, &mut visited, &mut overflow);
            node.cycle = true;
            forest.push(node);
            self.render_continuations(&mut forest, &mut visited, &mut overflow);
        }
        forest
    }

    fn render_continuations(
        &self,
        forest: &mut Vec<DisplayNode>,
        visited: &mut HashSet<PersonId>,
        overflow: &mut VecDeque<(&'a Person, PersonId)>,
    ) {
        while let Some((person, parent_id)) = overflow.pop_front() {
            let mut node = self.render_node(person, 0, visited, overflow);
            node.continued_from = Some(parent_id);
            forest.push(node);
        }
    }

    /// Depth-first walk on an explicit stack. Nodes are collected in
    /// pre-order and then attached to their parents back to front, so every
    /// child is complete before its parent takes it.
    fn render_node(
        &self,
        person: &Person,
        depth: usize,
        visited: &mut HashSet<PersonId>,
        overflow: &mut VecDeque<(&'a Person, PersonId)>,
    ) -> DisplayNode {
        let mut slots: Vec<Option<DisplayNode>> = Vec::new();
        let mut kids: Vec<Vec<usize>> = Vec::new();
        let mut stack: Vec<(&Person, usize, Option<usize>)> = vec![(person, depth, None)];
        visited.insert(person.id);

        while let Some((current, level, parent)) = stack.pop() {
            let index = slots.len();
            let mut node = self.node_fields(current, level);
            let mut fresh = Vec::new();
            for child in self.tree.children_of(current.id) {
                if !visited.insert(child.id) {
                    node.cycle = true;
                } else if level - depth >= MAX_RENDER_DEPTH {
                    overflow.push_back((child, current.id));
                } else {
                    fresh.push(child);
                }
            }
            slots.push(Some(node));
            kids.push(Vec::new());
            if let Some(parent) = parent {
                kids[parent].push(index);
            }
            stack.extend(
                fresh
                    .into_iter()
                    .rev()
                    .map(|child| (child, level + 1, Some(index))),
            );
        }

        for index in (0..slots.len()).rev() {
            let children: Vec<DisplayNode> =
                kids[index].iter().filter_map(|&k| slots[k].take()).collect();
            if let Some(node) = slots[index].as_mut() {
                node.children = children;
            }
        }
        slots
            .into_iter()
            .next()
            .flatten()
            .unwrap_or_else(|| self.node_fields(person, depth))
    }

    fn node_fields(&self, person: &Person, depth: usize) -> DisplayNode {
        DisplayNode {
            id: person.id,
            name: person.full_name(),
            initials: person.initials(),
            picture_url: person
                .profile_picture_url
                .clone()
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| PLACEHOLDER_PICTURE.to_string()),
            born: person.date_of_birth.map(|d| self.format_date(d)),
            died: person.date_of_death.map(|d| self.format_date(d)),
            married: person.marriage_date.map(|d| self.format_date(d)),
            age: person
                .date_of_birth
                .map(|birth| age_label(birth, person.date_of_death, self.today)),
            spouse: person
                .spouse_id
                .and_then(|id| self.tree.spouse_of(id))
                .map(Person::full_name),
            occasions: person
                .special_occasions
                .iter()
                .map(|occasion| OccasionLine {
                    name: occasion.name.clone(),
                    date: self.format_date(occasion.date),
                    description: occasion.description.clone(),
                })
                .collect(),
            depth,
            cycle: false,
            continued_from: None,
            children: Vec::new(),
        }
    }
}
