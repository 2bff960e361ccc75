//! 511.org departure prediction adapter.
//!
//! One call to `GetNextDeparturesByStopCode` per stop per refresh batch.
//! The XML response nests departure times under
//! AgencyList > Agency > RouteList > Route > RouteDirectionList >
//! RouteDirection > StopList > Stop > DepartureTimeList; every departure
//! time across all routes and directions becomes one prediction.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

use super::{PredictError, Predictor};
use crate::sync::{Prediction, Stop};

const SERVICE_URL: &str =
    "http://services.my511.org/Transit2.0/GetNextDeparturesByStopCode.aspx";

/// Source name stamped on every prediction, and the key under which the
/// access token is looked up in the config.
pub const SOURCE: &str = "511.org";

/// Client for the 511.org next-departures endpoint.
pub struct FiveElevenClient {
    client: Client,
    access_token: String,
}

impl FiveElevenClient {
    pub fn new(access_token: String) -> Result<Self, PredictError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PredictError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            access_token,
        })
    }
}

impl Predictor for FiveElevenClient {
    fn predict(
        &self,
        stop_key: &str,
        stop: &Stop,
    ) -> impl Future<Output = Result<Vec<Prediction>, PredictError>> + Send {
        async move {
            let url = format!(
                "{}?token={}&stopCode={}",
                SERVICE_URL,
                urlencoding::encode(&self.access_token),
                stop.code
            );

            // The endpoint expects a POST with an empty body.
            let response = self
                .client
                .post(&url)
                .send()
                .await
                .map_err(|e| PredictError::Network(e.to_string()))?;

            if !response.status().is_success() {
                return Err(PredictError::Api(format!(
                    "511.org responded with a non-success status code: {}",
                    response.status()
                )));
            }

            let body = response
                .text()
                .await
                .map_err(|e| PredictError::Network(e.to_string()))?;

            let parsed = parse_response(&body, stop.code)?;
            let predictions = parsed.into_predictions(stop_key, Utc::now());
            tracing::debug!(
                stop_key,
                stop_code = stop.code,
                count = predictions.len(),
                "Fetched predictions from 511.org"
            );
            Ok(predictions)
        }
    }
}

fn parse_response(body: &str, stop_code: u32) -> Result<NextDeparturesResponse, PredictError> {
    quick_xml::de::from_str(body).map_err(|e| {
        tracing::warn!(
            "Failed to parse 511.org response for stop {}: {} - body: {}",
            stop_code,
            e,
            body_preview(body)
        );
        PredictError::Parse(e.to_string())
    })
}

/// At most 500 bytes of the body for logging, cut on a char boundary so
/// a multi-byte character straddling the limit cannot panic the slice.
fn body_preview(body: &str) -> &str {
    if body.len() <= 500 {
        return body;
    }
    let mut end = 500;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

// Response structures

#[derive(Debug, Deserialize)]
struct NextDeparturesResponse {
    #[serde(rename = "AgencyList", default)]
    agency_list: AgencyList,
}

#[derive(Debug, Default, Deserialize)]
struct AgencyList {
    #[serde(rename = "Agency", default)]
    agencies: Vec<Agency>,
}

#[derive(Debug, Deserialize)]
struct Agency {
    #[serde(rename = "RouteList", default)]
    route_list: RouteList,
}

#[derive(Debug, Default, Deserialize)]
struct RouteList {
    #[serde(rename = "Route", default)]
    routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
struct Route {
    #[serde(rename = "RouteDirectionList", default)]
    direction_list: RouteDirectionList,
}

#[derive(Debug, Default, Deserialize)]
struct RouteDirectionList {
    #[serde(rename = "RouteDirection", default)]
    directions: Vec<RouteDirection>,
}

#[derive(Debug, Deserialize)]
struct RouteDirection {
    #[serde(rename = "StopList", default)]
    stop_list: StopList,
}

#[derive(Debug, Default, Deserialize)]
struct StopList {
    #[serde(rename = "Stop", default)]
    stops: Vec<StopElement>,
}

#[derive(Debug, Deserialize)]
struct StopElement {
    #[serde(rename = "DepartureTimeList", default)]
    departure_times: DepartureTimeList,
}

#[derive(Debug, Default, Deserialize)]
struct DepartureTimeList {
    #[serde(rename = "DepartureTime", default)]
    minutes: Vec<i32>,
}

impl NextDeparturesResponse {
    /// Flatten every departure time in the response into predictions, in
    /// document order.
    fn into_predictions(self, stop_key: &str, created_at: DateTime<Utc>) -> Vec<Prediction> {
        let mut predictions = Vec::new();
        for agency in self.agency_list.agencies {
            for route in agency.route_list.routes {
                for direction in route.direction_list.directions {
                    for stop in direction.stop_list.stops {
                        for minutes in stop.departure_times.minutes {
                            predictions.push(Prediction {
                                created_at,
                                minutes,
                                stop_key: stop_key.to_string(),
                                source: SOURCE.to_string(),
                            });
                        }
                    }
                }
            }
        }
        predictions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPARTURES_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<RTT>
  <AgencyList>
    <Agency Name="SF-MUNI" HasDirection="True" Mode="Bus">
      <RouteList>
        <Route Name="N-Judah" Code="N">
          <RouteDirectionList>
            <RouteDirection Code="Inbound" Name="Inbound to Caltrain">
              <StopList>
                <Stop name="Judah St and 9th Ave" StopCode="13222">
                  <DepartureTimeList>
                    <DepartureTime>5</DepartureTime>
                    <DepartureTime>15</DepartureTime>
                  </DepartureTimeList>
                </Stop>
              </StopList>
            </RouteDirection>
          </RouteDirectionList>
        </Route>
      </RouteList>
    </Agency>
  </AgencyList>
</RTT>"#;

    #[test]
    fn parses_departures_into_predictions_in_document_order() {
        let created_at = Utc::now();
        let response = parse_response(DEPARTURES_XML, 13222).unwrap();
        let predictions = response.into_predictions("home", created_at);

        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].minutes, 5);
        assert_eq!(predictions[1].minutes, 15);
        for p in &predictions {
            assert_eq!(p.stop_key, "home");
            assert_eq!(p.source, SOURCE);
            assert_eq!(p.created_at, created_at);
        }
    }

    #[test]
    fn a_stop_with_no_departures_yields_no_predictions() {
        let xml = r#"<RTT>
  <AgencyList>
    <Agency Name="SF-MUNI">
      <RouteList>
        <Route Name="N-Judah" Code="N">
          <RouteDirectionList/>
        </Route>
      </RouteList>
    </Agency>
  </AgencyList>
</RTT>"#;
        let response = parse_response(xml, 13222).unwrap();
        assert!(response.into_predictions("home", Utc::now()).is_empty());
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let result = parse_response("<RTT><AgencyList>", 13222);
        assert!(matches!(result, Err(PredictError::Parse(_))));
    }

    #[test]
    fn body_preview_cuts_on_a_char_boundary() {
        // 'é' is two bytes and straddles the 500-byte limit.
        let mut body = "a".repeat(499);
        body.push('é');
        body.push_str(&"x".repeat(50));

        let preview = body_preview(&body);
        assert_eq!(preview.len(), 499);
        assert!(preview.chars().all(|c| c == 'a'));

        assert_eq!(body_preview("short"), "short");
    }

    #[test]
    fn parse_failure_of_a_long_multibyte_body_is_logged_without_panicking() {
        // The warn! argument is only evaluated with a subscriber
        // installed, as in production.
        let subscriber = tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut body = "a".repeat(499);
        body.push('é');
        body.push_str(&"x".repeat(50));

        let result = parse_response(&body, 13222);
        assert!(matches!(result, Err(PredictError::Parse(_))));
    }
}
