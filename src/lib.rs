pub mod config;
pub mod detector;
pub mod entry;
pub mod importer;
pub mod parser;
pub mod patterns;
pub mod store;
pub mod validator;
