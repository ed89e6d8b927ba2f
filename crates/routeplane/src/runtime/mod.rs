//! Runtime support shared by the long-lived services

pub mod actor;
