//! Core evaluation engine for sponsored coaching project recruitment.
//!
//! Operators define projects with configurable evaluation criteria, coaches
//! submit applications with supporting evidence, verifiers cross-check that
//! evidence, reviewers score qualitative dimensions, and the engine blends
//! everything into a final ranking used to select participants.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
