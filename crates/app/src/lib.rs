//! `PostgreSQL` entity store, configuration and command-line surface for the conditions
//! resolver.

pub mod cli;
pub mod config;
pub mod context;
pub mod database;
pub mod observability;
pub mod store;

#[cfg(test)]
mod test;
