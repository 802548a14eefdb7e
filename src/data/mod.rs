pub mod configuration;
pub mod dbconnector;
pub mod pictures;
pub mod store;
