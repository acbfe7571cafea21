pub mod account;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod models;
pub mod rotation;
pub mod share;
pub mod worker;
