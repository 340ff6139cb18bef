use portwatch_common::{OutputFormat, Port};
use portwatch_config::{PortwatchConfigLoader, SourceDetails};
use serial_test::serial;
use std::{fs, path::PathBuf, time::Duration};
use tempfile::TempDir;

fn config_file(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).expect("config file written");
    path
}

#[test]
#[serial]
fn test_config_load() {
    let tmp = TempDir::new().expect("temp dir");

    let file_yaml = r#"
version: "1"
timezone: "Australia/Sydney"
output:
  dir: "/srv/arrivals"
  format: json
http:
  timeout_secs: 20
  retries: 1
sources:
  - port: sydney
    kind: paginated_table
    deadline_secs: 300
    config:
      url: "https://www.portauthoritynsw.com.au/movements"
      max_pages: 25
  - port: melbourne
    kind: heading_keyed
    enabled: false
    config:
      url: "https://ports.vic.gov.au/marine-operations/ship-movements/"
      heading_tag: h2
      tls_verify: false
  "#;
    let p = config_file(&tmp, "portwatch.yaml", file_yaml);

    let config = PortwatchConfigLoader::new()
        .with_file(p)
        .load()
        .expect("load portwatch config");

    assert_eq!(config.output.format, OutputFormat::Json);
    assert_eq!(config.output.dir, PathBuf::from("/srv/arrivals"));
    assert_eq!(config.http.timeout(), Duration::from_secs(20));
    assert_eq!(config.http.retries, 1);

    assert_eq!(config.sources.len(), 2);
    assert_eq!(config.sources[0].deadline(), Duration::from_secs(300));
    match &config.sources[0].details {
        SourceDetails::PaginatedTable { config } => {
            assert_eq!(config.max_pages, 25);
            assert_eq!(config.first_page, 1);
            assert_eq!(config.classification, "arrival");
        }
        other => panic!("expected paginated table, got {other:?}"),
    }
    match &config.sources[1].details {
        SourceDetails::HeadingKeyed { config } => {
            assert_eq!(config.heading_tag, "h2");
            assert_eq!(config.keyword, "arrival");
            assert!(!config.tls_verify);
        }
        other => panic!("expected heading keyed, got {other:?}"),
    }

    let enabled: Vec<Port> = config.enabled_sources().map(|s| s.port).collect();
    assert_eq!(enabled, vec![Port::Sydney]);
}

#[test]
#[serial]
fn missing_optional_file_falls_back_to_defaults() {
    let tmp = TempDir::new().expect("temp dir");
    let config = PortwatchConfigLoader::new()
        .with_optional_file(tmp.path().join("absent.yaml"))
        .load()
        .expect("defaults load");

    assert_eq!(config.sources.len(), 2);
    assert_eq!(config.timezone, "Australia/Sydney");
}

#[test]
#[serial]
fn missing_required_file_is_an_error() {
    let tmp = TempDir::new().expect("temp dir");
    let result = PortwatchConfigLoader::new()
        .with_file(tmp.path().join("absent.yaml"))
        .load();
    assert!(result.is_err());
}

#[test]
#[serial]
fn environment_overrides_file_values() {
    let tmp = TempDir::new().expect("temp dir");
    let p = config_file(
        &tmp,
        "portwatch.yaml",
        "output:\n  dir: from-file\nhttp:\n  timeout_secs: 15\n",
    );

    temp_env::with_vars(
        [
            ("PORTWATCH__OUTPUT__DIR", Some("from-env")),
            ("PORTWATCH__HTTP__TIMEOUT_SECS", Some("45")),
        ],
        || {
            let config = PortwatchConfigLoader::new()
                .with_file(&p)
                .load()
                .expect("load with env overrides");
            assert_eq!(config.output.dir, PathBuf::from("from-env"));
            assert_eq!(config.http.timeout_secs, 45);
        },
    );
}

#[test]
#[serial]
fn invalid_timezone_fails_load() {
    let result = PortwatchConfigLoader::new()
        .with_yaml_str("timezone: Not/AZone")
        .load();
    assert!(result.is_err());
}

#[test]
#[serial]
fn zero_page_cap_fails_load() {
    let err = PortwatchConfigLoader::new()
        .with_yaml_str(
            r#"
sources:
  - port: sydney
    kind: paginated_table
    config:
      url: "https://sydney.example.com/moves"
      max_pages: 0
"#,
        )
        .load()
        .unwrap_err();
    assert!(err.to_string().contains("max_pages must be at least 1"));
    assert!(err.to_string().contains("Sydney"));

    let one = PortwatchConfigLoader::new()
        .with_yaml_str(
            "sources:\n  - port: sydney\n    kind: paginated_table\n    config: { url: \"https://s.example.com/\", max_pages: 1 }\n",
        )
        .load();
    assert!(one.is_ok());
}
