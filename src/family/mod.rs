//! Family members and the tree built from them.
//!
//! [`tree::FamilyTree`] indexes a flat list of people by parent and spouse,
//! [`render::Renderer`] turns that into nested display nodes, and
//! [`dashboard::Dashboard`] ties both to a [`crate::data::store::FamilyStore`].

pub mod dashboard;
pub mod form;
pub mod person;
pub mod render;
pub mod tree;
pub mod view;
