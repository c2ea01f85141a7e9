// Enrichment pipeline: request pacing and table processing

pub mod ingestion;
pub mod processing;
