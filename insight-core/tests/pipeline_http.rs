//! End-to-end pipeline tests against mock weather and language-model servers.

use insight_core::{
    Category, Config, InsightStore, MetadataStore, PersistOutcome, Pipeline, ProviderConfig,
    Stage, classifier_from_config, default_provider_from_config,
};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CITIES_CSV: &str = "city,country,population,latitude,longitude\n\
                          Paris,France,2148000,48.8566,2.3522\n";

fn config(weather: &MockServer, llm: &MockServer) -> Config {
    let mut cfg = Config::default();
    cfg.providers.insert(
        "openweather".into(),
        ProviderConfig { api_key: "OW_KEY".into(), base_url: Some(weather.uri()) },
    );
    cfg.default_provider = Some("openweather".into());
    cfg.llm.api_key = Some("sk-test".into());
    cfg.llm.base_url = Some(llm.uri());
    cfg.timeout_secs = Some(5);
    cfg
}

fn pipeline(cfg: &Config) -> Pipeline {
    cfg.validate().expect("complete config");
    Pipeline::new(
        MetadataStore::from_csv_str(CITIES_CSV).expect("table"),
        default_provider_from_config(cfg).expect("weather provider"),
        classifier_from_config(cfg).expect("classifier"),
    )
}

async fn mount_paris(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("q", "Paris"))
        .and(query_param("appid", "OW_KEY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "main": { "temp": 16.789, "humidity": 77 },
            "wind": { "speed": 4.634 },
            "weather": [{ "description": "light rain" }]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("q", "Nowhereville"))
        .respond_with(
            ResponseTemplate::new(404).set_body_string(r#"{"cod":"404","message":"city not found"}"#),
        )
        .mount(server)
        .await;
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
    }))
}

#[tokio::test]
async fn unknown_city_is_skipped_and_reported() {
    let weather = MockServer::start().await;
    let llm = MockServer::start().await;
    mount_paris(&weather).await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4o-mini",
            "temperature": 0.0,
            "max_tokens": 10
        })))
        .respond_with(completion("Rainy"))
        .expect(1)
        .mount(&llm)
        .await;

    let cfg = config(&weather, &llm);
    let p = pipeline(&cfg).with_store(InsightStore::in_memory().unwrap());

    let report = p.run(&["Paris", "Nowhereville"]).await;

    assert_eq!(report.records.len(), 1);
    let paris = &report.records[0];
    assert_eq!(paris.city, "Paris");
    assert_eq!(paris.country.as_deref(), Some("France"));
    assert_eq!(paris.population, Some(2_148_000));
    assert_eq!(paris.temperature_c, 16.79);
    assert_eq!(paris.humidity_pct, 77.0);
    assert_eq!(paris.wind_speed_mps, 4.63);
    assert_eq!(paris.description, "light rain");
    assert_eq!(paris.ai_category, Category::Rainy);

    let fetch_failures: Vec<_> = report.failures_for(Stage::WeatherFetch).collect();
    assert_eq!(fetch_failures.len(), 1);
    assert_eq!(fetch_failures[0].city.as_deref(), Some("Nowhereville"));
    assert!(fetch_failures[0].reason.contains("404"));

    assert_eq!(report.persisted, PersistOutcome::Persisted(1));
    let stored = p.store().expect("store").recent(10).unwrap();
    assert_eq!(stored, report.records);
}

#[tokio::test]
async fn unreachable_model_yields_unknown() {
    let weather = MockServer::start().await;
    let llm = MockServer::start().await;
    mount_paris(&weather).await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&llm)
        .await;

    let cfg = config(&weather, &llm);
    let report = pipeline(&cfg).run(&["Paris"]).await;

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].ai_category, Category::Unknown);

    let classify_failures: Vec<_> = report.failures_for(Stage::Classify).collect();
    assert_eq!(classify_failures.len(), 1);
    assert!(classify_failures[0].reason.contains("503"));
}

#[tokio::test]
async fn refused_connection_yields_unknown() {
    let weather = MockServer::start().await;
    mount_paris(&weather).await;

    let llm = MockServer::start().await;
    let mut cfg = config(&weather, &llm);
    // Nothing listens on the discard port.
    cfg.llm.base_url = Some("http://127.0.0.1:9".into());

    let report = pipeline(&cfg).run(&["Paris"]).await;

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].ai_category, Category::Unknown);
}

#[tokio::test]
async fn hallucinated_answer_never_leaks() {
    let weather = MockServer::start().await;
    let llm = MockServer::start().await;
    mount_paris(&weather).await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion("Drizzle, mostly"))
        .mount(&llm)
        .await;

    let cfg = config(&weather, &llm);
    let report = pipeline(&cfg).run(&["Paris"]).await;

    assert_eq!(report.records[0].ai_category, Category::Unknown);
    assert!(Category::all().contains(&report.records[0].ai_category));
}

#[tokio::test]
async fn storage_failure_still_returns_records() {
    let weather = MockServer::start().await;
    let llm = MockServer::start().await;
    mount_paris(&weather).await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion("Rainy"))
        .mount(&llm)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("insights.db");
    let store = InsightStore::open(&db_path).unwrap();

    // Break the table out from under the store.
    {
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute_batch("DROP TABLE weather_insights;").unwrap();
    }

    let cfg = config(&weather, &llm);
    let report = pipeline(&cfg).with_store(store).run(&["Paris"]).await;

    assert_eq!(report.records.len(), 1);
    assert!(matches!(report.persisted, PersistOutcome::Failed(_)));
    assert_eq!(report.failures_for(Stage::Persist).count(), 1);
}

#[tokio::test]
async fn rerunning_append_does_not_duplicate() {
    let weather = MockServer::start().await;
    let llm = MockServer::start().await;
    mount_paris(&weather).await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion("Rainy"))
        .mount(&llm)
        .await;

    let cfg = config(&weather, &llm);
    let p = pipeline(&cfg).with_store(InsightStore::in_memory().unwrap());
    let report = p.run(&["Paris"]).await;

    let store = p.store().expect("store");
    assert_eq!(store.append(&report.records).unwrap(), 0);
    assert_eq!(store.count().unwrap(), 1);
}
