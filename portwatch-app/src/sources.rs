//! Turns configured source specs into live extractors.

use anyhow::{Context, Result};
use portwatch_config::{HttpConfig, PortwatchConfig, SourceDetails, SourceSpec};
use portwatch_extract::{
    ExtractorRegistry, HeadingKeyedExtractor, Normalizer, PaginatedTableExtractor,
    PaginationSettings, SectionSettings, SourceExtractor,
};
use portwatch_http::{ClientOpts, HttpClient};
use std::sync::Arc;
use url::Url;

pub fn build_registry(cfg: &PortwatchConfig, normalizer: &Normalizer) -> Result<ExtractorRegistry> {
    let mut registry = ExtractorRegistry::new();
    for spec in cfg.enabled_sources() {
        let extractor = build_extractor(spec, &cfg.http, normalizer.clone())
            .with_context(|| format!("source {}", spec.port))?;
        registry.register(extractor, spec.deadline())?;
    }
    if registry.is_empty() {
        tracing::warn!("app.sources.none_enabled");
    }
    Ok(registry)
}

fn build_extractor(
    spec: &SourceSpec,
    http: &HttpConfig,
    normalizer: Normalizer,
) -> Result<Arc<dyn SourceExtractor>> {
    let url = Url::parse(spec.url()).with_context(|| format!("invalid url {:?}", spec.url()))?;
    let client = Arc::new(client_for(spec, http)?);

    let extractor: Arc<dyn SourceExtractor> = match &spec.details {
        SourceDetails::PaginatedTable { config } => Arc::new(PaginatedTableExtractor::new(
            spec.port,
            url,
            client,
            normalizer,
            PaginationSettings {
                page_param: config.page_param.clone(),
                first_page: config.first_page,
                max_pages: config.max_pages,
                classification: config.classification.clone(),
            },
        )),
        SourceDetails::HeadingKeyed { config } => Arc::new(HeadingKeyedExtractor::new(
            spec.port,
            url,
            client,
            normalizer,
            SectionSettings {
                heading_tag: config.heading_tag.clone(),
                keyword: config.keyword.clone(),
            },
        )?),
    };
    Ok(extractor)
}

fn client_for(spec: &SourceSpec, http: &HttpConfig) -> Result<HttpClient> {
    let defaults = ClientOpts::default();
    let opts = ClientOpts {
        connect_timeout: http.connect_timeout(),
        user_agent: http.user_agent.clone().unwrap_or(defaults.user_agent),
        tls_verify: spec.tls_verify(),
    };
    Ok(HttpClient::with_opts(spec.url(), opts)?
        .with_timeout(http.timeout())
        .with_retries(http.retries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use portwatch_common::Port;
    use portwatch_config::PortwatchConfigLoader;

    fn normalizer() -> Normalizer {
        Normalizer::new(chrono_tz::Australia::Sydney)
    }

    #[test]
    fn defaults_register_both_ports() {
        let registry = build_registry(&PortwatchConfig::default(), &normalizer()).unwrap();
        assert_eq!(registry.ports(), vec![Port::Sydney, Port::Melbourne]);
    }

    #[test]
    fn disabled_sources_are_skipped() {
        let cfg = PortwatchConfigLoader::new()
            .with_yaml_str(
                r#"
sources:
  - port: sydney
    kind: paginated_table
    config:
      url: "https://sydney.example.com/moves"
  - port: melbourne
    enabled: false
    kind: heading_keyed
    config:
      url: "https://melbourne.example.com/moves"
"#,
            )
            .load()
            .unwrap();
        let registry = build_registry(&cfg, &normalizer()).unwrap();
        assert_eq!(registry.ports(), vec![Port::Sydney]);
    }

    #[test]
    fn duplicate_ports_are_a_configuration_error() {
        let cfg = PortwatchConfigLoader::new()
            .with_yaml_str(
                r#"
sources:
  - port: sydney
    kind: paginated_table
    config: { url: "https://a.example.com/" }
  - port: sydney
    kind: heading_keyed
    config: { url: "https://b.example.com/" }
"#,
            )
            .load()
            .unwrap();
        let err = build_registry(&cfg, &normalizer()).unwrap_err();
        assert!(err.to_string().contains("already has a registered extractor"));
    }

    #[test]
    fn bad_heading_tag_names_the_source() {
        let cfg = PortwatchConfigLoader::new()
            .with_yaml_str(
                r#"
sources:
  - port: melbourne
    kind: heading_keyed
    config: { url: "https://b.example.com/", heading_tag: "h3 a" }
"#,
            )
            .load()
            .unwrap();
        let err = build_registry(&cfg, &normalizer()).unwrap_err();
        assert!(format!("{err:#}").contains("Melbourne"));
    }
}
