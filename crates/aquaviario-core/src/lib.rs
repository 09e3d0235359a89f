pub mod columns;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod partitions;
pub mod pipeline;
pub mod quality;
pub mod queries;
pub mod registry;
pub mod report;
pub mod tiers;
pub mod topics;
