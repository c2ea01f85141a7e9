// Pipeline ingestion: pacing of outbound catalog requests

pub mod rate_limiter;
