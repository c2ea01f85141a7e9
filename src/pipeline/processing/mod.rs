// Pipeline processing: table preparation, catalog lookups, cross-match and column merging

pub mod columns;
pub mod lookup;
pub mod prepare;
pub mod report;
pub mod resolve;
pub mod xmatch;

pub use columns::{ColumnOptions, DuplicatePolicy};
pub use lookup::{enrich_by_lookup, lookup_source, LookupRequest, MatchMode};
pub use prepare::{prepare_table, PrepareOptions};
pub use report::{Diagnostic, DiagnosticKind, EnrichOutcome, EnrichStats};
pub use resolve::{resolve_name, resolve_region, ResolveFilter};
pub use xmatch::{cross_match_table, EnrichRequest};
