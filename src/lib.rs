pub mod config;
pub mod humanize;
pub mod observability;
pub mod queue;
pub mod storage;
pub mod transfer;
pub mod worker;
