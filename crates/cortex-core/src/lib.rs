//! Business logic and repository trait definitions for Cortex.
//!
//! This crate defines the "ports" (repository traits and the similarity
//! capability) that the infrastructure layer implements, the three stateful
//! services built on them, and the pipeline that composes those services into
//! one request/response cycle. It depends only on `cortex-types` -- never on
//! `cortex-infra` or any database/IO crate.

pub mod dedup;
pub mod pipeline;
pub mod repository;
pub mod service;
pub mod similarity;
