use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::app::ports::{BatchMatch, BatchQuery, BatchResponse, CatalogResponse, CatalogServicePort, ConeQuery, NameResolverPort};
use crate::common::constants::{VIZIER_SERVICE, XMATCH_MAX_BATCH_SIZE, XMATCH_SERVICE};
use crate::common::error::{EnrichError, Result};
use crate::domain::{CatalogEntry, Coordinate, Radius, Value};

#[derive(Debug, Clone)]
struct StoredSource {
    coordinate: Coordinate,
    fields: Vec<(String, Value)>,
}

#[derive(Debug, Default)]
struct Failures {
    /// Batch requests containing any of these rows fail.
    rows: HashSet<usize>,
    /// Cone searches centred on any of these positions fail.
    centers: Vec<Coordinate>,
    /// The next N requests of any kind fail.
    transient: usize,
}

/// In-memory catalog service for development/testing
///
/// Searches are real positional queries over the stored sources; failures
/// can be injected per row, per position or for the next few calls.
pub struct InMemoryCatalog {
    catalogs: Arc<Mutex<HashMap<String, (Vec<String>, Vec<StoredSource>)>>>,
    failures: Arc<Mutex<Failures>>,
    max_batch: usize,
    calls: AtomicUsize,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            catalogs: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(Failures::default())),
            max_batch: XMATCH_MAX_BATCH_SIZE,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    /// Declares a catalog and the columns its responses report.
    pub fn add_catalog(&self, id: &str, columns: &[&str]) {
        let mut catalogs = self.catalogs.lock().unwrap();
        catalogs.insert(
            id.to_string(),
            (columns.iter().map(|c| c.to_string()).collect(), Vec::new()),
        );
    }

    pub fn add_source(&self, id: &str, coordinate: Coordinate, fields: Vec<(&str, Value)>) {
        let mut catalogs = self.catalogs.lock().unwrap();
        let (_, sources) = catalogs.entry(id.to_string()).or_default();
        sources.push(StoredSource {
            coordinate,
            fields: fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        });
    }

    pub fn fail_rows(&self, rows: impl IntoIterator<Item = usize>) {
        self.failures.lock().unwrap().rows.extend(rows);
    }

    pub fn fail_center(&self, center: Coordinate) {
        self.failures.lock().unwrap().centers.push(center);
    }

    pub fn fail_next(&self, count: usize) {
        self.failures.lock().unwrap().transient = count;
    }

    /// Number of requests received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn take_transient(&self, service: &str) -> Result<()> {
        let mut failures = self.failures.lock().unwrap();
        if failures.transient > 0 {
            failures.transient -= 1;
            return Err(EnrichError::remote(service, "injected transient failure"));
        }
        Ok(())
    }

    fn search(&self, catalog: &str, center: Coordinate, radius: Radius) -> Result<(Vec<String>, Vec<CatalogEntry>)> {
        let catalogs = self.catalogs.lock().unwrap();
        let Some((columns, sources)) = catalogs.get(catalog) else {
            return Err(EnrichError::rejected(VIZIER_SERVICE, format!("unknown table {catalog}")));
        };
        let entries = sources
            .iter()
            .filter_map(|s| {
                let separation_arcsec = center.separation_arcsec(&s.coordinate);
                radius.contains(separation_arcsec).then(|| CatalogEntry {
                    coordinate: s.coordinate,
                    fields: s.fields.clone(),
                    separation_arcsec,
                })
            })
            .collect();
        Ok((columns.clone(), entries))
    }
}

#[async_trait]
impl CatalogServicePort for InMemoryCatalog {
    async fn cone_search(&self, query: &ConeQuery) -> Result<CatalogResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.take_transient(VIZIER_SERVICE)?;
        let failing = self
            .failures
            .lock()
            .unwrap()
            .centers
            .iter()
            .any(|c| c.separation_arcsec(&query.center) < 1e-6);
        if failing {
            return Err(EnrichError::remote(VIZIER_SERVICE, "injected failure"));
        }
        let (columns, entries) = self.search(&query.catalog.id, query.center, query.radius)?;
        debug!(catalog = %query.catalog.id, entries = entries.len(), "in-memory cone search");
        Ok(CatalogResponse { columns, entries })
    }

    async fn cross_match(&self, query: &BatchQuery) -> Result<BatchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.take_transient(XMATCH_SERVICE)?;
        if query.positions.len() > self.max_batch {
            return Err(EnrichError::remote(XMATCH_SERVICE, "batch exceeds service limit"));
        }
        let failing = {
            let failures = self.failures.lock().unwrap();
            query.positions.iter().any(|(row, _)| failures.rows.contains(row))
        };
        if failing {
            return Err(EnrichError::remote(XMATCH_SERVICE, "injected failure"));
        }

        let mut response = BatchResponse::default();
        for (row, center) in &query.positions {
            let (columns, entries) = self.search(&query.catalog.id, *center, query.radius)?;
            response.columns = columns;
            response
                .matches
                .extend(entries.into_iter().map(|entry| BatchMatch { row: *row, entry }));
        }
        Ok(response)
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }
}

/// In-memory stand-in for the name resolver
#[derive(Default)]
pub struct InMemoryResolver {
    objects: Arc<Mutex<Vec<(Vec<String>, StoredSource)>>>,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an object under one or more identifiers.
    pub fn add_object(&self, names: &[&str], coordinate: Coordinate, fields: Vec<(&str, Value)>) {
        self.objects.lock().unwrap().push((
            names.iter().map(|n| n.to_string()).collect(),
            StoredSource {
                coordinate,
                fields: fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            },
        ));
    }
}

#[async_trait]
impl NameResolverPort for InMemoryResolver {
    async fn resolve_name(&self, name: &str) -> Result<Vec<CatalogEntry>> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|(names, _)| names.iter().any(|n| n.eq_ignore_ascii_case(name)))
            .map(|(_, s)| CatalogEntry {
                coordinate: s.coordinate,
                fields: s.fields.clone(),
                separation_arcsec: 0.0,
            })
            .collect())
    }

    async fn query_region(&self, center: Coordinate, radius: Radius) -> Result<Vec<CatalogEntry>> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter_map(|(_, s)| {
                let separation_arcsec = center.separation_arcsec(&s.coordinate);
                radius.contains(separation_arcsec).then(|| CatalogEntry {
                    coordinate: s.coordinate,
                    fields: s.fields.clone(),
                    separation_arcsec,
                })
            })
            .collect())
    }
}
