use portwatch_common::{Snapshot, SourceStatus};

/// One console line per source, failures called out explicitly.
pub fn summary_lines(snapshot: &Snapshot) -> Vec<String> {
    snapshot
        .sources
        .iter()
        .map(|(port, source)| {
            let n = source.records.len();
            match &source.status {
                SourceStatus::Complete => format!("{port}: {n} arrivals found."),
                SourceStatus::Partial { error } => {
                    format!("{port}: {n} arrivals found (incomplete: {error}).")
                }
                SourceStatus::Failed { error } => format!("{port}: FAILED, no data ({error})."),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use portwatch_common::{Port, SourceSnapshot};

    #[test]
    fn zero_arrivals_and_failure_read_differently() {
        let at = FixedOffset::east_opt(11 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 1, 11, 0, 0)
            .unwrap();
        let mut snapshot = Snapshot::new(at);
        snapshot.insert(Port::Sydney, SourceSnapshot::complete(Vec::new(), 1));
        snapshot.insert(Port::Melbourne, SourceSnapshot::failed("timed out"));

        assert_eq!(
            summary_lines(&snapshot),
            vec![
                "Sydney: 0 arrivals found.".to_string(),
                "Melbourne: FAILED, no data (timed out).".to_string(),
            ]
        );
    }
}
