mod common;

use common::{FakeFetcher, arrival, frozen_normalizer, init_test_tracing, table_page, table_page_owned};
use futures::StreamExt;
use portwatch_common::Port;
use portwatch_extract::{
    ExtractError, PaginatedTableExtractor, PaginationSettings, SourceExtractor,
};
use std::sync::Arc;
use url::Url;

const BASE: &str = "https://ports.example.com/moves";

fn page(n: u32) -> String {
    format!("{BASE}?page={n}")
}

fn extractor(fetcher: Arc<FakeFetcher>, settings: PaginationSettings) -> PaginatedTableExtractor {
    PaginatedTableExtractor::new(
        Port::Sydney,
        Url::parse(BASE).unwrap(),
        fetcher,
        frozen_normalizer(),
        settings,
    )
}

#[tokio::test]
async fn stops_at_the_first_header_only_page() {
    init_test_tracing();
    let fetcher = FakeFetcher::new()
        .page(&page(1), table_page_owned(&[arrival("Aurora"), arrival("Borealis")]))
        .page(&page(2), table_page_owned(&[arrival("Corona")]))
        .page(&page(3), table_page(&[]))
        .page(&page(4), table_page_owned(&[arrival("NeverFetched")]));

    let extraction = extractor(fetcher.clone(), PaginationSettings::default())
        .extract()
        .await;

    let vessels: Vec<&str> = extraction.records.iter().map(|r| r.vessel.as_str()).collect();
    assert_eq!(vessels, vec!["Aurora", "Borealis", "Corona"]);
    assert_eq!(extraction.pages_fetched, 3);
    assert!(extraction.error.is_none());
    assert_eq!(fetcher.requested(), vec![page(1), page(2), page(3)]);
}

#[tokio::test]
async fn a_page_without_a_table_also_terminates() {
    let fetcher = FakeFetcher::new()
        .page(&page(1), table_page_owned(&[arrival("Aurora")]))
        .page(&page(2), "<html><body><p>No movements scheduled.</p></body></html>");

    let extraction = extractor(fetcher.clone(), PaginationSettings::default())
        .extract()
        .await;

    assert_eq!(extraction.records.len(), 1);
    assert!(extraction.into_source().status.is_complete());
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn only_arrival_rows_with_eight_cells_are_kept() {
    let fetcher = FakeFetcher::new()
        .page(
            &page(1),
            table_page(&[
                &["2024-01-01 10:00", "09:30", "ARRIVAL", "Kept", "B1", "-", "Fiji", "Sydney"],
                &["2024-01-01 11:00", "10:30", "Departure", "Leaving", "B2", "-", "Sydney", "Fiji"],
                &["2024-01-01 12:00", "11:30", "Arrival", "TooShort", "B3", "-", "Fiji"],
                &["2024-01-01 13:00", "12:30", "arrival", "AlsoKept", "B4", "-", "Nauru", "Sydney", "x"],
            ]),
        )
        .page(&page(2), table_page(&[]));

    let extraction = extractor(fetcher, PaginationSettings::default())
        .extract()
        .await;

    let vessels: Vec<&str> = extraction.records.iter().map(|r| r.vessel.as_str()).collect();
    assert_eq!(vessels, vec!["Kept", "AlsoKept"]);
    let kept = &extraction.records[0];
    assert_eq!(kept.event_datetime, "2024-01-01 10:00");
    assert_eq!(kept.eta.as_deref(), Some("09:30"));
    assert_eq!(kept.berth.as_deref(), Some("B1"));
    assert_eq!(kept.origin, "Fiji");
    assert_eq!(kept.destination, "Sydney");
    assert_eq!(kept.category, None);
}

#[tokio::test]
async fn header_only_first_page_means_zero_records_not_failure() {
    let fetcher = FakeFetcher::new().page(&page(1), table_page(&[]));

    let source = extractor(fetcher, PaginationSettings::default())
        .extract()
        .await
        .into_source();

    assert!(source.status.is_complete());
    assert!(source.records.is_empty());
    assert_eq!(source.pages_fetched, 1);
}

#[tokio::test]
async fn mid_run_fetch_failure_keeps_earlier_rows_as_partial() {
    let fetcher = FakeFetcher::new()
        .page(&page(1), table_page_owned(&[arrival("Aurora")]))
        .fail(&page(2), "connection reset");

    let extraction = extractor(fetcher, PaginationSettings::default())
        .extract()
        .await;

    assert!(matches!(extraction.error, Some(ExtractError::Fetch { .. })));
    let source = extraction.into_source();
    assert_eq!(source.status.label(), "partial");
    assert_eq!(source.records.len(), 1);
    assert!(source.status.error().unwrap().contains("connection reset"));
}

#[tokio::test]
async fn repeated_page_content_trips_the_stagnation_guard() {
    let echoed = table_page_owned(&[arrival("Aurora")]);
    let fetcher = FakeFetcher::new()
        .page(&page(1), echoed.clone())
        .page(&page(2), echoed.clone())
        .page(&page(3), echoed);

    let extraction = extractor(fetcher.clone(), PaginationSettings::default())
        .extract()
        .await;

    assert!(matches!(
        extraction.error,
        Some(ExtractError::StagnantPagination { page: 2, .. })
    ));
    assert_eq!(extraction.records.len(), 1);
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn page_cap_bounds_a_site_that_never_runs_dry() {
    let mut fetcher = FakeFetcher::new();
    for n in 1..=10 {
        fetcher = fetcher.page(&page(n), table_page_owned(&[arrival(&format!("Ship{n}"))]));
    }

    let settings = PaginationSettings {
        max_pages: 3,
        ..Default::default()
    };
    let extraction = extractor(fetcher.clone(), settings).extract().await;

    assert!(matches!(
        extraction.error,
        Some(ExtractError::PaginationCapExceeded { max_pages: 3, .. })
    ));
    assert_eq!(extraction.records.len(), 3);
    assert_eq!(extraction.pages_fetched, 3);
    assert_eq!(fetcher.calls(), 4);
    assert_eq!(extraction.into_source().status.label(), "partial");
}

#[tokio::test]
async fn pages_stream_yields_the_terminal_batch_last() {
    let fetcher = FakeFetcher::new()
        .page(&page(1), table_page_owned(&[arrival("Aurora")]))
        .page(&page(2), table_page(&[]));
    let ex = extractor(fetcher, PaginationSettings::default());

    let batches: Vec<_> = ex.pages().collect().await;

    assert_eq!(batches.len(), 2);
    let first = batches[0].as_ref().unwrap();
    assert_eq!(first.page, 1);
    assert!(!first.is_terminal());
    let last = batches[1].as_ref().unwrap();
    assert!(last.table_found);
    assert!(last.is_terminal());
}

#[tokio::test]
async fn custom_first_page_and_param_are_used() {
    let fetcher = FakeFetcher::new()
        .page(&format!("{BASE}?p=0"), table_page_owned(&[arrival("Aurora")]))
        .page(&format!("{BASE}?p=1"), table_page(&[]));
    let settings = PaginationSettings {
        page_param: "p".into(),
        first_page: 0,
        ..Default::default()
    };

    let extraction = extractor(fetcher, settings).extract().await;

    assert!(extraction.error.is_none());
    assert_eq!(extraction.records.len(), 1);
}
