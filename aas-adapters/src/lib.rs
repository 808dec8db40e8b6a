pub mod capsvc;
pub mod cloud;
pub mod cluster;
pub mod directory;
pub mod exchange;
pub mod models;
pub mod scim;
