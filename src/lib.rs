//! brandkit: turns a brand questionnaire into staged draft content
//! (products, providers, training programs, before/after transformations),
//! lets reviewers regenerate any single category with feedback, and merges
//! accepted content into the persistent brand document.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod requirements;
pub mod service;
