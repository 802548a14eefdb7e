pub mod accounts;
pub mod helpers;
pub mod people;
