#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use portwatch_common::observability::{LogConfig, LogFormat};
use portwatch_extract::{FixedClock, Normalizer};
use portwatch_http::{FetchedPage, HttpError, PageFetcher, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use url::Url;

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "portwatch-tests",
            log_dir: Some(std::env::temp_dir().join("portwatch-tests")),
            emit_stderr: true,
            format: LogFormat::Text,
            default_filter: "debug",
        };
        portwatch_common::observability::init_logging(config).unwrap_or_default()
    });
}

enum Canned {
    Body(String),
    Fail(String),
    Hang,
}

/// Serves canned bodies keyed by full URL and counts every request.
///
/// Unknown URLs fail as a network error.
#[derive(Default)]
pub struct FakeFetcher {
    pages: Mutex<HashMap<String, Canned>>,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(self: &Arc<Self>, url: &str, body: impl Into<String>) -> Arc<Self> {
        self.insert(url, Canned::Body(body.into()))
    }

    pub fn fail(self: &Arc<Self>, url: &str, message: &str) -> Arc<Self> {
        self.insert(url, Canned::Fail(message.to_string()))
    }

    /// Never answers, to exercise deadlines.
    pub fn hang(self: &Arc<Self>, url: &str) -> Arc<Self> {
        self.insert(url, Canned::Hang)
    }

    fn insert(self: &Arc<Self>, url: &str, canned: Canned) -> Arc<Self> {
        self.pages.lock().unwrap().insert(url.to_string(), canned);
        Arc::clone(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, HttpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(url.to_string());

        let canned = match self.pages.lock().unwrap().get(url.as_str()) {
            Some(Canned::Body(body)) => Canned::Body(body.clone()),
            Some(Canned::Fail(message)) => Canned::Fail(message.clone()),
            Some(Canned::Hang) => Canned::Hang,
            None => Canned::Fail(format!("no canned page for {url}")),
        };
        match canned {
            Canned::Body(body) => Ok(FetchedPage {
                url: url.clone(),
                status: StatusCode::OK,
                body,
            }),
            Canned::Fail(message) => Err(HttpError::Network(message)),
            Canned::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(HttpError::Timeout(url.to_string()))
            }
        }
    }
}

pub fn frozen_normalizer() -> Normalizer {
    let instant = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    Normalizer::with_clock(Arc::new(FixedClock(instant)), chrono_tz::Australia::Sydney)
}

/// An HTML page holding one table: a header row and then `rows`.
pub fn table_page(rows: &[&[&str]]) -> String {
    let mut html = String::from(
        "<html><body><table><tr><th>Date</th><th>ETA</th><th>Type</th><th>Vessel</th>\
         <th>Berth</th><th>Agent</th><th>From</th><th>To</th></tr>",
    );
    for row in rows {
        html.push_str("<tr>");
        for cell in *row {
            html.push_str(&format!("<td> {cell} </td>"));
        }
        html.push_str("</tr>");
    }
    html.push_str("</table></body></html>");
    html
}

pub fn arrival(vessel: &str) -> [String; 8] {
    [
        "2024-01-01 10:00".into(),
        "09:30".into(),
        "Arrival".into(),
        vessel.into(),
        "B1".into(),
        "Agent".into(),
        "PortX".into(),
        "PortY".into(),
    ]
}

pub fn table_page_owned(rows: &[[String; 8]]) -> String {
    let refs: Vec<Vec<&str>> = rows
        .iter()
        .map(|r| r.iter().map(String::as_str).collect())
        .collect();
    let slices: Vec<&[&str]> = refs.iter().map(Vec::as_slice).collect();
    table_page(&slices)
}
