use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{info, warn};

/// Forecast endpoint of weatherapi.com, one request per invocation.
pub const DEFAULT_FORECAST_ENDPOINT: &str = "http://api.weatherapi.com/v1/forecast.json";

/// Rain measured so far today, in inches, that has to be exceeded
/// before the forecast is allowed to veto a run.
pub const DEFAULT_RAIN_THRESHOLD_IN: f64 = 0.25;

/// Settings for the weather lookup. The API key is a secret and is
/// normally supplied through the environment rather than the yaml file.
#[derive(Deserialize, Serialize, Clone, PartialEq, Debug)]
pub struct WeatherConfig {
    /// Forecast service URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Location string understood by the service.
    #[serde(default = "default_location")]
    pub location: String,
    /// Credential sent as the `key` query parameter.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Precipitation in inches that must be exceeded to veto.
    #[serde(default = "default_rain_threshold")]
    pub rain_threshold_in: f64,
}

fn default_endpoint() -> String {
    String::from(DEFAULT_FORECAST_ENDPOINT)
}

fn default_location() -> String {
    String::from("carlsbad")
}

fn default_rain_threshold() -> f64 {
    DEFAULT_RAIN_THRESHOLD_IN
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            location: default_location(),
            api_key: None,
            rain_threshold_in: default_rain_threshold(),
        }
    }
}

/// The parts of the forecast body the gate reads.
#[derive(Deserialize, Debug, PartialEq)]
pub struct ForecastResponse {
    pub current: CurrentConditions,
    pub forecast: Forecast,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct CurrentConditions {
    /// Precipitation measured so far today, inches.
    pub precip_in: f64,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct Forecast {
    pub forecastday: Vec<ForecastDay>,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct ForecastDay {
    pub day: DaySummary,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct DaySummary {
    /// 1 when rain is expected later today, else 0.
    pub daily_will_it_rain: u8,
}

impl ForecastResponse {
    /// Veto only when it has already rained more than `threshold_in` AND
    /// more rain is forecast. Either signal alone lets the run go ahead.
    /// A body without a forecast day counts as no forecast.
    pub fn is_rain_veto(&self, threshold_in: f64) -> bool {
        let will_it_rain = self
            .forecast
            .forecastday
            .first()
            .map(|today| today.day.daily_will_it_rain == 1)
            .unwrap_or(false);
        self.current.precip_in > threshold_in && will_it_rain
    }
}

/// Anything that can veto a run because of rain.
pub trait RainGate {
    /// True when the run should be skipped. Implementations fail open.
    fn should_skip_for_rain(&self) -> impl Future<Output = bool>;
}

/// Rain veto backed by the weatherapi.com forecast service.
pub struct WeatherGate {
    client: reqwest::Client,
    config: WeatherConfig,
}

impl WeatherGate {
    /// Create a gate from its config.
    ///
    /// * `config`: endpoint, location and credential.
    pub fn new(config: WeatherConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Single GET for a one day forecast. Every failure is reported as
    /// `None` after logging it, the caller treats that as "do not skip".
    async fn fetch_forecast(&self, api_key: &str) -> Option<ForecastResponse> {
        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("key", api_key),
                ("q", self.config.location.as_str()),
                ("days", "1"),
            ])
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!("failed to get weather: {e}");
                return None;
            }
        };

        if response.status() != reqwest::StatusCode::OK {
            warn!("failed to get weather, service answered {}", response.status());
            return None;
        }

        match response.json::<ForecastResponse>().await {
            Ok(forecast) => Some(forecast),
            Err(e) => {
                warn!("failed to parse weather: {e}");
                None
            }
        }
    }
}

impl RainGate for WeatherGate {
    async fn should_skip_for_rain(&self) -> bool {
        let Some(api_key) = self.config.api_key.as_deref() else {
            warn!("No weather api key configured, rain status unknown");
            return false;
        };

        match self.fetch_forecast(api_key).await {
            Some(forecast) => {
                let veto = forecast.is_rain_veto(self.config.rain_threshold_in);
                info!(
                    precip_in = forecast.current.precip_in,
                    veto, "Weather retrieved for {}", self.config.location
                );
                veto
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    fn forecast_body(precip_in: f64, daily_will_it_rain: u8) -> String {
        format!(
            r#"{{"location": {{"name": "Carlsbad"}},
                "current": {{"temp_f": 61.0, "precip_in": {precip_in}}},
                "forecast": {{"forecastday": [
                    {{"date": "2024-08-07", "day": {{"daily_will_it_rain": {daily_will_it_rain}, "daily_chance_of_rain": 80}}}}
                ]}}}}"#
        )
    }

    /// Serve exactly one canned HTTP response on a loopback port and hand
    /// back the endpoint to point the gate at.
    async fn serve_once(status_line: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind port");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut request = vec![0u8; 4096];
                let _ = socket.read(&mut request).await;
                let response = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}/v1/forecast.json")
    }

    fn gate_for(endpoint: String) -> WeatherGate {
        WeatherGate::new(WeatherConfig {
            endpoint,
            api_key: Some(String::from("test-key")),
            ..WeatherConfig::default()
        })
    }

    #[rstest]
    #[case(0.30, 1, true)]
    #[case(1.20, 1, true)]
    #[case(0.25, 1, false)]
    #[case(0.0, 1, false)]
    #[case(0.30, 0, false)]
    #[case(2.00, 0, false)]
    #[case(0.0, 0, false)]
    fn test_rain_veto_requires_both_signals(
        #[case] precip_in: f64,
        #[case] daily_will_it_rain: u8,
        #[case] expected: bool,
    ) {
        let forecast: ForecastResponse =
            serde_json::from_str(&forecast_body(precip_in, daily_will_it_rain)).unwrap();
        assert_eq!(
            forecast.is_rain_veto(DEFAULT_RAIN_THRESHOLD_IN),
            expected,
            "precip_in {precip_in}, daily_will_it_rain {daily_will_it_rain}"
        );
    }

    #[test]
    fn test_missing_forecast_day_does_not_veto() {
        let forecast: ForecastResponse = serde_json::from_str(
            r#"{"current": {"precip_in": 3.0}, "forecast": {"forecastday": []}}"#,
        )
        .unwrap();
        assert!(!forecast.is_rain_veto(DEFAULT_RAIN_THRESHOLD_IN));
    }

    #[tokio::test]
    async fn test_gate_vetoes_on_rainy_forecast() {
        let endpoint = serve_once("200 OK", forecast_body(0.5, 1)).await;
        assert!(gate_for(endpoint).should_skip_for_rain().await);
    }

    #[tokio::test]
    async fn test_gate_allows_dry_forecast() {
        let endpoint = serve_once("200 OK", forecast_body(0.0, 1)).await;
        assert!(!gate_for(endpoint).should_skip_for_rain().await);
    }

    #[rstest]
    #[case("401 Unauthorized")]
    #[case("403 Forbidden")]
    #[case("500 Internal Server Error")]
    #[tokio::test]
    async fn test_gate_fails_open_on_error_status(#[case] status_line: &'static str) {
        // The body would veto if it were ever read.
        let endpoint = serve_once(status_line, forecast_body(3.0, 1)).await;
        assert!(!gate_for(endpoint).should_skip_for_rain().await);
    }

    #[tokio::test]
    async fn test_gate_fails_open_on_malformed_body() {
        let endpoint = serve_once("200 OK", String::from(r#"{"error": "nope"}"#)).await;
        assert!(!gate_for(endpoint).should_skip_for_rain().await);
    }

    #[tokio::test]
    async fn test_gate_fails_open_when_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let gate = gate_for(format!("http://{addr}/v1/forecast.json"));
        assert!(!gate.should_skip_for_rain().await);
    }

    #[tokio::test]
    async fn test_gate_without_key_does_not_skip() {
        let gate = WeatherGate::new(WeatherConfig::default());
        assert!(!gate.should_skip_for_rain().await);
    }
}
