//! Test infrastructure.

mod db;

pub(crate) use db::TestDb;
