#![deny(clippy::mod_module_files)]
//! Composer repository mirrored from the projects of a GitLab instance.
//!
//! A background poller reconciles GitLab projects, branches and tags into a
//! [`repository::PackageCache`]; the HTTP server serves its snapshot as
//! `/packages.json`.

pub mod config;
pub mod error;
pub mod gitlab;
pub mod poller;
pub mod repository;
pub mod server;
