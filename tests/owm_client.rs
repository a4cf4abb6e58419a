use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_test::assert_ok;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use barnbook_footing::errors::AppError;
use barnbook_footing::services::forecast::ForecastSource;
use barnbook_footing::services::owm::OwmClient;

const NOW: i64 = 1777723200; // 2026-05-02T12:00:00Z

fn client(server: &MockServer) -> OwmClient {
    OwmClient::new(&server.uri(), "test-key", Duration::from_secs(5)).unwrap()
}

fn onecall_body() -> serde_json::Value {
    serde_json::json!({
        "timezone_offset": -21600,
        "current": {
            "dt": NOW,
            "temp": 61.0,
            "wind_speed": 4.5,
            "weather": [{ "id": 800, "main": "Clear" }]
        },
        "hourly": [],
        "daily": [{
            "dt": 1777744800,
            "sunrise": 1777722000,
            "sunset": 1777772400,
            "temp": { "min": 44.0, "max": 70.0 },
            "wind_speed": 8.0,
            "pop": 0.1,
            "weather": [{ "id": 800, "main": "Clear" }]
        }]
    })
}

fn history_body(dt: i64, rain_mm: f64) -> serde_json::Value {
    serde_json::json!({
        "data": [{ "dt": dt, "rain": { "1h": rain_mm } }]
    })
}

#[tokio::test]
async fn test_forecast_request_carries_key_and_units() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/3.0/onecall"))
        .and(query_param("appid", "test-key"))
        .and(query_param("units", "imperial"))
        .and(query_param("lat", "39.7400"))
        .and(query_param("lon", "-104.9900"))
        .respond_with(ResponseTemplate::new(200).set_body_json(onecall_body()))
        .expect(1)
        .mount(&server)
        .await;

    let bundle = assert_ok!(client(&server).get_forecast(39.74, -104.99).await);
    assert_eq!(bundle.daily.len(), 1);
    assert_eq!(bundle.current.temp_f, 61.0);
}

#[tokio::test]
async fn test_forecast_http_error_is_external_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/3.0/onecall"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = client(&server).get_forecast(39.74, -104.99).await;
    assert!(matches!(result, Err(AppError::ExternalServiceError(_))));
}

#[tokio::test]
async fn test_recent_rain_requests_each_hour() {
    let server = MockServer::start().await;
    for (k, mm) in [(0i64, 2.54), (1, 0.0), (2, 5.08)] {
        let dt = NOW - k * 3600;
        Mock::given(method("GET"))
            .and(path("/data/3.0/onecall/timemachine"))
            .and(query_param("dt", dt.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(history_body(dt, mm)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let now = DateTime::<Utc>::from_timestamp(NOW, 0).unwrap();
    let samples = assert_ok!(client(&server).get_recent_rain(39.74, -104.99, 3, now).await);

    assert_eq!(samples.len(), 3);
    assert!(samples.windows(2).all(|w| w[0].time < w[1].time));
    let total: f64 = samples.iter().map(|s| s.amount_inches).sum();
    assert!((total - 0.3).abs() < 1e-9);
}

#[tokio::test]
async fn test_recent_rain_fails_when_any_hour_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/3.0/onecall/timemachine"))
        .and(query_param("dt", NOW.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(history_body(NOW, 1.0)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/3.0/onecall/timemachine"))
        .and(query_param("dt", (NOW - 3600).to_string()))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let now = DateTime::<Utc>::from_timestamp(NOW, 0).unwrap();
    let result = client(&server).get_recent_rain(39.74, -104.99, 2, now).await;
    assert!(result.is_err());
}
