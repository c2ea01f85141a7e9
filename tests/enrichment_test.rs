use std::sync::Arc;

use anyhow::Result;
use tempfile::tempdir;

use catalog_enricher::app::context::{BatchSettings, EnrichContext};
use catalog_enricher::app::enrich_use_case::{EnrichStep, EnrichUseCase};
use catalog_enricher::domain::{Coordinate, SourceRecord, SourceTable, Value};
use catalog_enricher::infra::table_io::{read_csv, write_csv, TableLayout};
use catalog_enricher::infra::{InMemoryCatalog, InMemoryResolver};
use catalog_enricher::pipeline::processing::{
    cross_match_table, enrich_by_lookup, lookup_source, prepare_table, resolve_name, resolve_region, ColumnOptions,
    DiagnosticKind, EnrichRequest, LookupRequest, MatchMode, PrepareOptions, ResolveFilter,
};
use catalog_enricher::EnrichError;

const TWOMASS: &str = "II/246/out";
const GAIA: &str = "I/355/gaiadr3";

fn north_of(center: Coordinate, arcsec: f64) -> Coordinate {
    Coordinate::new(center.ra_deg(), center.dec_deg() + arcsec / 3600.0).unwrap()
}

fn context(catalog: &Arc<InMemoryCatalog>, batch_size: usize, max_concurrency: usize) -> EnrichContext {
    EnrichContext::new(catalog.clone(), Arc::new(InMemoryResolver::new())).with_settings(BatchSettings {
        batch_size,
        max_concurrency,
        retries: 1,
        retry_backoff_ms: 1,
    })
}

/// One catalog source 1" north of each of `count` positions spread along
/// the equator; the source's `id` is the row it belongs to.
fn spread_table(catalog: &InMemoryCatalog, count: usize) -> SourceTable {
    catalog.add_catalog(TWOMASS, &["id", "Jmag"]);
    let mut records = Vec::with_capacity(count);
    for row in 0..count {
        let position = Coordinate::new(row as f64 * 5.0, 1.0).unwrap();
        catalog.add_source(
            TWOMASS,
            north_of(position, 1.0),
            vec![("id", Value::Int(row as i64)), ("Jmag", Value::Float(10.0 + row as f64 / 100.0))],
        );
        records.push(SourceRecord::from_coordinate(position).with_field("idx", Value::Int(row as i64)));
    }
    SourceTable::from_records(records)
}

#[tokio::test]
async fn test_designations_to_enriched_table() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.add_catalog(TWOMASS, &["_2MASS", "Jmag", "Hmag"]);

    let table = SourceTable::from_records(vec![
        SourceRecord::from_designation("J120000.00+100000.0"),
        SourceRecord::from_designation("J130000.00+200000.0"),
        SourceRecord::from_designation("J140000.00-050000.0"),
    ]);
    let prepared = prepare_table(&table, &PrepareOptions::default())?;
    let first = prepared.rows()[0].coordinate.unwrap();
    let second = prepared.rows()[1].coordinate.unwrap();
    let third = prepared.rows()[2].coordinate.unwrap();
    assert!((first.ra_deg() - 180.0).abs() < 1e-9 && (first.dec_deg() - 10.0).abs() < 1e-9);
    assert!((third.ra_deg() - 210.0).abs() < 1e-9 && (third.dec_deg() + 5.0).abs() < 1e-9);

    catalog.add_source(TWOMASS, north_of(first, 4.0), vec![("_2MASS", Value::from("a")), ("Jmag", Value::Float(12.1)), ("Hmag", Value::Float(11.6))]);
    catalog.add_source(TWOMASS, north_of(second, 40.0), vec![("_2MASS", Value::from("far")), ("Jmag", Value::Float(9.0)), ("Hmag", Value::Float(8.8))]);
    catalog.add_source(TWOMASS, north_of(third, 6.0), vec![("_2MASS", Value::from("c")), ("Jmag", Value::Float(14.3)), ("Hmag", Value::Float(13.9))]);

    let ctx = context(&catalog, 500, 4);
    let outcome = cross_match_table(&ctx, &prepared, &EnrichRequest::new("2mass", 10.0)).await?;
    let out = &outcome.table;

    assert_eq!(out.len(), 3);
    assert_eq!(outcome.prefix, "2mass");
    assert_eq!(out.get(0, "2mass_Jmag"), Some(&Value::Float(12.1)));
    assert_eq!(out.get(2, "2mass_Hmag"), Some(&Value::Float(13.9)));
    let sep = out.get(0, "2mass_sep_arcsec").and_then(Value::as_f64).unwrap();
    assert!((sep - 4.0).abs() < 1e-4);

    for column in ["2mass_sep_arcsec", "2mass_ra", "2mass_dec", "2mass__2MASS", "2mass_Jmag", "2mass_Hmag"] {
        assert_eq!(out.get(1, column), Some(&Value::Null), "row 2 column {column}");
    }
    assert_eq!(outcome.stats.matched, 2);
    assert_eq!(outcome.stats.unmatched, 1);
    assert!(outcome.skipped_rows().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_row_count_and_order_survive_chunking() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let table = spread_table(&catalog, 50);

    for (batch_size, concurrency) in [(7, 3), (1, 8), (50, 1), (500, 4)] {
        let ctx = context(&catalog, batch_size, concurrency);
        let outcome = cross_match_table(&ctx, &table, &EnrichRequest::new("2mass", 2.0)).await?;
        assert_eq!(outcome.table.len(), 50);
        assert_eq!(outcome.stats.chunks, 50usize.div_ceil(batch_size));
        for row in 0..50 {
            assert_eq!(outcome.table.get(row, "idx"), Some(&Value::Int(row as i64)));
            assert_eq!(outcome.table.get(row, "2mass_id"), Some(&Value::Int(row as i64)));
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_service_limit_caps_chunk_size() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new().with_max_batch(4));
    let table = spread_table(&catalog, 10);
    let ctx = context(&catalog, 500, 2);

    let outcome = cross_match_table(&ctx, &table, &EnrichRequest::new("2mass", 2.0)).await?;
    assert_eq!(outcome.stats.chunks, 3);
    assert_eq!(outcome.stats.matched, 10);
    Ok(())
}

#[tokio::test]
async fn test_nearest_of_three_candidates() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.add_catalog(TWOMASS, &["name"]);
    let center = Coordinate::new(83.8221, -5.3911)?;
    for (arcsec, name) in [(30.0, "thirty"), (5.0, "five"), (12.0, "twelve")] {
        catalog.add_source(TWOMASS, north_of(center, arcsec), vec![("name", Value::from(name))]);
    }
    let ctx = context(&catalog, 500, 4);

    let nearest = lookup_source(&ctx, center, &LookupRequest::new("2mass", 60.0, MatchMode::Nearest)).await?;
    assert_eq!(nearest.len(), 1);
    assert_eq!(nearest.entries[0].field("name"), Some(&Value::from("five")));
    assert!((nearest.entries[0].separation_arcsec - 5.0).abs() < 1e-4);

    let all = lookup_source(&ctx, center, &LookupRequest::new("2mass", 60.0, MatchMode::All)).await?;
    let names: Vec<_> = all.entries.iter().filter_map(|e| e.field("name").cloned()).collect();
    assert_eq!(names, vec![Value::from("five"), Value::from("twelve"), Value::from("thirty")]);

    let table = SourceTable::from_records(vec![SourceRecord::from_coordinate(center)]);
    let outcome = cross_match_table(&ctx, &table, &EnrichRequest::new("2mass", 60.0)).await?;
    assert_eq!(outcome.table.get(0, "2mass_name"), Some(&Value::from("five")));
    Ok(())
}

#[tokio::test]
async fn test_empty_lookup_is_not_an_error() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.add_catalog(TWOMASS, &["Jmag"]);
    let ctx = context(&catalog, 500, 4);

    let result = lookup_source(&ctx, Coordinate::new(1.0, 1.0)?, &LookupRequest::new("2mass", 5.0, MatchMode::Nearest)).await?;
    assert!(result.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_two_catalogs_with_same_field_get_distinct_columns() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.add_catalog(TWOMASS, &["mag"]);
    catalog.add_catalog(GAIA, &["mag"]);
    let center = Coordinate::new(10.0, 20.0)?;
    catalog.add_source(TWOMASS, north_of(center, 0.5), vec![("mag", Value::Float(11.0))]);
    catalog.add_source(GAIA, north_of(center, 0.2), vec![("mag", Value::Float(13.5))]);

    let table = SourceTable::from_records(vec![SourceRecord::from_coordinate(center).with_field("mag", Value::Float(1.0))]);
    let use_case = EnrichUseCase::new(
        context(&catalog, 500, 4),
        vec![
            EnrichStep::xmatch(EnrichRequest::new("2mass", 2.0)),
            EnrichStep::lookup(EnrichRequest::new("gaia", 2.0)),
        ],
    );
    let (out, report) = use_case.execute(table).await?;

    assert_eq!(out.get(0, "mag"), Some(&Value::Float(1.0)));
    assert_eq!(out.get(0, "2mass_mag"), Some(&Value::Float(11.0)));
    assert_eq!(out.get(0, "gaia_mag"), Some(&Value::Float(13.5)));
    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.steps[1].prefix, "gaia");
    assert_eq!(report.rows, 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_chunk_is_isolated() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let table = spread_table(&catalog, 9);
    catalog.fail_rows([4]);
    let ctx = context(&catalog, 3, 3);

    let outcome = cross_match_table(&ctx, &table, &EnrichRequest::new("2mass", 2.0)).await?;
    assert_eq!(outcome.table.len(), 9);
    for row in [0, 1, 2, 6, 7, 8] {
        assert_eq!(outcome.table.get(row, "2mass_id"), Some(&Value::Int(row as i64)));
    }
    for row in [3, 4, 5] {
        assert_eq!(outcome.table.get(row, "2mass_id"), Some(&Value::Null));
        assert_eq!(outcome.table.get(row, "2mass_sep_arcsec"), Some(&Value::Null));
    }
    assert_eq!(outcome.skipped_rows(), vec![3, 4, 5]);
    assert_eq!(outcome.stats.failed_chunks, 1);
    assert_eq!(outcome.stats.failed, 3);
    assert_eq!(outcome.stats.matched, 6);
    assert!(outcome
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::RemoteFailure)
        .all(|d| d.chunk == Some(1)));
    Ok(())
}

#[tokio::test]
async fn test_transient_failure_is_retried() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let table = spread_table(&catalog, 4);
    catalog.fail_next(1);
    let ctx = context(&catalog, 500, 1);

    let outcome = cross_match_table(&ctx, &table, &EnrichRequest::new("2mass", 2.0)).await?;
    assert_eq!(outcome.stats.failed, 0);
    assert_eq!(outcome.stats.matched, 4);
    assert_eq!(catalog.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_refused_chunk_is_not_retried() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let table = spread_table(&catalog, 4);
    let ctx = context(&catalog, 500, 1);

    let outcome = cross_match_table(&ctx, &table, &EnrichRequest::new("J/ApJ/999/1", 2.0)).await?;
    assert_eq!(catalog.calls(), 1);
    assert_eq!(outcome.stats.failed_chunks, 1);
    assert_eq!(outcome.stats.failed, 4);
    assert!(outcome.diagnostics.iter().all(|d| d.kind == DiagnosticKind::RemoteFailure));
    Ok(())
}

#[tokio::test]
async fn test_failed_lookup_is_isolated_to_its_row() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let table = spread_table(&catalog, 5);
    catalog.fail_center(table.rows()[2].coordinate.unwrap());
    let ctx = context(&catalog, 500, 2);

    let outcome = enrich_by_lookup(&ctx, &table, &EnrichRequest::new("2mass", 2.0)).await?;
    assert_eq!(outcome.skipped_rows(), vec![2]);
    assert!(outcome.table.get(2, "2mass_id").is_some_and(Value::is_null));
    assert_eq!(outcome.table.get(4, "2mass_id"), Some(&Value::Int(4)));
    assert_eq!(outcome.stats.matched, 4);
    Ok(())
}

#[tokio::test]
async fn test_rows_without_coordinates_get_sentinels() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let mut records = spread_table(&catalog, 2).rows().to_vec();
    records.insert(1, SourceRecord::from_designation("unresolvable").with_field("idx", Value::Int(-1)));
    let table = SourceTable::from_records(records);
    let ctx = context(&catalog, 500, 4);

    let outcome = cross_match_table(&ctx, &table, &EnrichRequest::new("2mass", 2.0)).await?;
    assert_eq!(outcome.table.len(), 3);
    assert_eq!(outcome.table.get(1, "2mass_id"), Some(&Value::Null));
    assert_eq!(outcome.table.get(2, "2mass_id"), Some(&Value::Int(1)));
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::MissingCoordinate && d.row == Some(1)));
    Ok(())
}

#[tokio::test]
async fn test_repeat_enrichment_is_guarded() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let table = spread_table(&catalog, 3);
    let ctx = context(&catalog, 500, 4);

    let once = cross_match_table(&ctx, &table, &EnrichRequest::new("2mass", 2.0)).await?;
    let calls = catalog.calls();

    let again = cross_match_table(&ctx, &once.table, &EnrichRequest::new("2mass", 2.0)).await;
    assert!(matches!(again, Err(EnrichError::InvalidParameter(_))));
    assert_eq!(catalog.calls(), calls);

    let repeated = cross_match_table(&ctx, &once.table, &EnrichRequest::new("2mass", 2.0).allow_repeat()).await?;
    assert_eq!(repeated.prefix, "2mass_2");
    assert_eq!(repeated.table.get(0, "2mass_2_id"), Some(&Value::Int(0)));
    assert_eq!(repeated.table.get(0, "2mass_id"), Some(&Value::Int(0)));

    let aliased = cross_match_table(&ctx, &once.table, &EnrichRequest::new("2mass", 2.0).with_alias("tm")).await?;
    assert!(aliased.table.has_column("tm_sep_arcsec"));
    Ok(())
}

#[tokio::test]
async fn test_survey_column_sharing_the_prefix_is_not_a_repeat() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.add_catalog(GAIA, &["Source", "Gmag"]);
    let center = Coordinate::new(120.0, 20.0)?;
    catalog.add_source(
        GAIA,
        north_of(center, 0.5),
        vec![("Source", Value::Int(6_000_000_000_000_000_001)), ("Gmag", Value::Float(14.2))],
    );
    let table = SourceTable::from_records(vec![
        SourceRecord::from_coordinate(center).with_field("gaia_dr2_id", Value::Int(3_000_000_000_000_000_007))
    ]);
    let ctx = context(&catalog, 500, 4);

    let outcome = cross_match_table(&ctx, &table, &EnrichRequest::new("gaia", 2.0)).await?;
    assert_eq!(outcome.prefix, "gaia");
    assert_eq!(outcome.table.get(0, "gaia_dr2_id"), Some(&Value::Int(3_000_000_000_000_000_007)));
    assert_eq!(outcome.table.get(0, "gaia_Source"), Some(&Value::Int(6_000_000_000_000_000_001)));
    assert_eq!(outcome.table.get(0, "gaia_Gmag"), Some(&Value::Float(14.2)));

    let explicit = EnrichRequest::new("gaia", 2.0).with_columns(ColumnOptions::only(["Gmag"]));
    let outcome = cross_match_table(&ctx, &table, &explicit).await?;
    assert_eq!(outcome.prefix, "gaia");
    Ok(())
}

#[tokio::test]
async fn test_existing_column_for_a_requested_field_is_a_repeat() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.add_catalog(GAIA, &["Gmag"]);
    let center = Coordinate::new(120.0, 20.0)?;
    catalog.add_source(GAIA, north_of(center, 0.5), vec![("Gmag", Value::Float(14.2))]);
    let table = SourceTable::from_records(vec![
        SourceRecord::from_coordinate(center).with_field("gaia_Gmag", Value::Float(14.0))
    ]);
    let ctx = context(&catalog, 500, 4);

    let request = EnrichRequest::new("gaia", 2.0).with_columns(ColumnOptions::only(["Gmag"]));
    let rejected = cross_match_table(&ctx, &table, &request).await;
    assert!(matches!(rejected, Err(EnrichError::InvalidParameter(_))));
    assert_eq!(catalog.calls(), 0);

    // Every-field requests only learn about Gmag from the response.
    let outcome = cross_match_table(&ctx, &table, &EnrichRequest::new("gaia", 2.0)).await?;
    assert_eq!(outcome.table.get(0, "gaia_Gmag"), Some(&Value::Float(14.0)));
    assert!(outcome.table.has_column("gaia_sep_arcsec"));
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::SchemaWarning && d.message.contains("gaia_Gmag")));
    Ok(())
}

#[tokio::test]
async fn test_equidistant_candidates_keep_response_order() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.add_catalog(TWOMASS, &["name"]);
    let center = Coordinate::new(45.0, -30.0)?;
    let twin = north_of(center, 1.0);
    catalog.add_source(TWOMASS, twin, vec![("name", Value::from("first"))]);
    catalog.add_source(TWOMASS, twin, vec![("name", Value::from("second"))]);
    let ctx = context(&catalog, 500, 4);

    let table = SourceTable::from_records(vec![SourceRecord::from_coordinate(center)]);
    let outcome = cross_match_table(&ctx, &table, &EnrichRequest::new("2mass", 2.0)).await?;
    assert_eq!(outcome.table.get(0, "2mass_name"), Some(&Value::from("first")));

    let by_lookup = enrich_by_lookup(&ctx, &table, &EnrichRequest::new("2mass", 2.0)).await?;
    assert_eq!(by_lookup.table.get(0, "2mass_name"), Some(&Value::from("first")));
    Ok(())
}

#[tokio::test]
async fn test_invalid_parameters_fail_before_any_request() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let table = spread_table(&catalog, 3);
    let ctx = context(&catalog, 500, 4);
    let center = Coordinate::new(5.0, 5.0)?;

    let missing_radius = EnrichRequest {
        catalog: "2mass".to_string(),
        ..Default::default()
    };
    for request in [missing_radius, EnrichRequest::new("2mass", -1.0), EnrichRequest::new("2mass", 0.0), EnrichRequest::new("nonsense", 2.0)] {
        let result = cross_match_table(&ctx, &table, &request).await;
        assert!(matches!(result, Err(EnrichError::InvalidParameter(_))), "{request:?}");
        let result = enrich_by_lookup(&ctx, &table, &request).await;
        assert!(matches!(result, Err(EnrichError::InvalidParameter(_))), "{request:?}");
    }
    let lookup = lookup_source(&ctx, center, &LookupRequest::new("2mass", f64::NAN, MatchMode::All)).await;
    assert!(matches!(lookup, Err(EnrichError::InvalidParameter(_))));

    assert_eq!(catalog.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_absent_requested_column_is_a_warning() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let table = spread_table(&catalog, 2);
    let ctx = context(&catalog, 500, 4);

    let request = EnrichRequest::new("2mass", 2.0).with_columns(ColumnOptions::only(["Jmag", "Kmag"]));
    let outcome = cross_match_table(&ctx, &table, &request).await?;
    assert!(outcome.table.has_column("2mass_Jmag"));
    assert!(!outcome.table.has_column("2mass_Kmag"));
    assert!(!outcome.table.has_column("2mass_id"));
    assert_eq!(outcome.schema_warnings().count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_csv_round_trip_keeps_sentinels() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let table = spread_table(&catalog, 4);
    catalog.fail_rows([3]);
    let ctx = context(&catalog, 2, 2);
    let outcome = cross_match_table(&ctx, &table, &EnrichRequest::new("2mass", 2.0)).await?;

    let dir = tempdir()?;
    let path = dir.path().join("out").join("enriched.csv");
    let layout = TableLayout::default();
    write_csv(&outcome.table, &path, &layout)?;
    let back = read_csv(&path, &layout)?;

    assert_eq!(back.len(), 4);
    assert_eq!(back.columns(), outcome.table.columns());
    for row in 0..4 {
        assert_eq!(back.rows()[row].coordinate, outcome.table.rows()[row].coordinate);
        assert_eq!(back.get(row, "2mass_id"), outcome.table.get(row, "2mass_id"));
        for column in ["2mass_sep_arcsec", "2mass_Jmag"] {
            assert_eq!(back.get(row, column), outcome.table.get(row, column), "row {row} column {column}");
        }
    }
    assert_eq!(back.get(0, "2mass_Jmag"), Some(&Value::Float(10.0)));
    assert_eq!(back.get(3, "2mass_Jmag"), Some(&Value::Null));
    Ok(())
}

#[tokio::test]
async fn test_name_and_region_resolution() -> Result<()> {
    let resolver = Arc::new(InMemoryResolver::new());
    let trappist = Coordinate::new(346.6223, -5.0413)?;
    resolver.add_object(
        &["TRAPPIST-1", "2MASS J23062928-0502285"],
        trappist,
        vec![("main_id", Value::from("TRAPPIST-1")), ("otype", Value::from("BD*"))],
    );
    resolver.add_object(
        &["TRAPPIST-1 b"],
        trappist,
        vec![("main_id", Value::from("TRAPPIST-1 b")), ("otype", Value::from("Pl"))],
    );
    resolver.add_object(
        &["HD 218261"],
        north_of(trappist, 90.0),
        vec![("main_id", Value::from("HD 218261")), ("otype", Value::from("Star"))],
    );
    let ctx = EnrichContext::new(Arc::new(InMemoryCatalog::new()), resolver);

    let by_name = resolve_name(&ctx, "trappist-1", &ResolveFilter::default()).await?;
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name.entries[0].separation_arcsec, 0.0);

    let region = resolve_region(&ctx, trappist, Some(120.0), &ResolveFilter::excluding(["pl"])).await?;
    let ids: Vec<_> = region.entries.iter().filter_map(|e| e.field("main_id").cloned()).collect();
    assert_eq!(ids, vec![Value::from("TRAPPIST-1"), Value::from("HD 218261")]);

    let nearest = resolve_region(&ctx, north_of(trappist, 80.0), Some(120.0), &ResolveFilter::default().nearest()).await?;
    assert_eq!(nearest.entries[0].field("main_id"), Some(&Value::from("HD 218261")));

    assert!(resolve_name(&ctx, "nobody", &ResolveFilter::default()).await?.is_empty());
    assert!(matches!(resolve_name(&ctx, "  ", &ResolveFilter::default()).await, Err(EnrichError::InvalidParameter(_))));
    assert!(matches!(
        resolve_region(&ctx, trappist, None, &ResolveFilter::default()).await,
        Err(EnrichError::InvalidParameter(_))
    ));
    Ok(())
}
