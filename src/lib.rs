//! Domain valuations kept in locally persisted collections: a portfolio of
//! saved valuations (kept 24 hours), a history of batch valuations (kept 7
//! days) and a login flag.

pub mod activity;
pub mod app_state;
pub mod auth;
pub mod collection;
pub mod config;
pub mod error;
pub mod history;
pub mod portfolio;
pub mod report;
pub mod storage;
pub mod subscribers;
pub mod valuation;
pub mod workflow;
