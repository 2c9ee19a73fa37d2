//! `keeper-api` — HTTP surface over the backup engine.

pub mod app;
