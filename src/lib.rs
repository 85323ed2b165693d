//! voiceboard - embedded document store and credential lifecycle for a
//! campus issue portal
//!
//! Layers, leaves first:
//! - [`storage`]: single-file transactional bucket store
//! - [`repository`]: typed records over buckets
//! - [`auth`]: password hashing, session tokens, accounts, password resets
//! - [`issues`]: issue lifecycle and voting
//! - [`notify`]: outbound notification hook
//! - [`portal`]: wires the services to one store

pub mod auth;
pub mod cli;
pub mod config;
pub mod issues;
pub mod logging;
pub mod models;
pub mod notify;
pub mod portal;
pub mod repository;
pub mod storage;
