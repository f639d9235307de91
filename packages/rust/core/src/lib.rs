//! Core pipeline orchestration and domain logic for LeadScout.
//!
//! This crate ties together discovery, extraction, deduplication, scoring,
//! research, drafting, review and export into the end-to-end `run` and
//! `review` workflows.

pub mod dedupe;
pub mod drafting;
pub mod export;
pub mod extraction;
pub mod operator;
pub mod pipeline;
pub mod query;
pub mod research;
pub mod review;
pub mod scoring;

#[cfg(test)]
mod testing;
