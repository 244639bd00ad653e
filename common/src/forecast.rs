//! Tonight's minimum temperature from a weatherapi.com `forecast.json` response.
//!
//! Only `forecast.forecastday[0].day.mintemp_c` is kept. The response also
//! carries a full hourly forecast, which serde skips while streaming the body.

use std::io::{self, BufReader, Read};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on bytes read from a forecast response before giving up.
pub const MAX_FORECAST_BODY: usize = 128 * 1024;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("forecast source is not configured")]
    NotConfigured,
    #[error("forecast request failed: {0}")]
    Transport(String),
    #[error("forecast request returned HTTP {0}")]
    HttpStatus(u16),
    #[error("forecast response exceeded {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("forecast response has no minimum temperature for today")]
    MissingField,
    #[error("forecast temperature {0} is not a plausible value")]
    InvalidTemperature(f64),
    #[error("forecast response is not valid JSON: {0}")]
    Json(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub api_key: String,
    /// Anything weatherapi.com accepts for `q`: a city, a postcode, or `lat,lon`.
    pub location: String,
    pub base_url: String,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            location: String::new(),
            base_url: "http://api.weatherapi.com/v1/forecast.json".to_string(),
        }
    }
}

impl ForecastConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.location.trim().is_empty()
    }

    pub fn request_url(&self) -> Result<String, ForecastError> {
        if !self.is_configured() {
            return Err(ForecastError::NotConfigured);
        }

        Ok(format!(
            "{}?key={}&q={}&days=1&aqi=no&alerts=no",
            self.base_url.trim_end_matches('?'),
            urlencoding::encode(self.api_key.trim()),
            urlencoding::encode(self.location.trim()),
        ))
    }
}

pub fn check_status(status: u16) -> Result<(), ForecastError> {
    if status == 200 {
        Ok(())
    } else {
        Err(ForecastError::HttpStatus(status))
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    forecast: Option<ForecastSection>,
}

#[derive(Debug, Deserialize)]
struct ForecastSection {
    #[serde(default)]
    forecastday: Vec<ForecastDay>,
}

#[derive(Debug, Deserialize)]
struct ForecastDay {
    day: Option<DaySummary>,
}

#[derive(Debug, Deserialize)]
struct DaySummary {
    mintemp_c: Option<f64>,
}

impl ForecastResponse {
    fn tonight_low(self) -> Result<i32, ForecastError> {
        let low = self
            .forecast
            .and_then(|forecast| forecast.forecastday.into_iter().next())
            .and_then(|today| today.day)
            .and_then(|day| day.mintemp_c)
            .ok_or(ForecastError::MissingField)?;
        whole_degrees(low)
    }
}

/// Reads a response body and returns tonight's low in whole degrees.
///
/// At most [`MAX_FORECAST_BODY`] bytes are consumed. I/O failures while
/// reading are reported as [`ForecastError::Transport`].
pub fn read_tonight_low<R: Read>(body: R) -> Result<i32, ForecastError> {
    let mut capped = CountingReader {
        inner: body.take(MAX_FORECAST_BODY as u64 + 1),
        count: 0,
    };
    let parsed = serde_json::from_reader::<_, ForecastResponse>(BufReader::new(&mut capped));

    if capped.count > MAX_FORECAST_BODY {
        return Err(ForecastError::BodyTooLarge {
            limit: MAX_FORECAST_BODY,
        });
    }

    match parsed {
        Ok(response) => response.tonight_low(),
        Err(err) if err.is_io() => Err(ForecastError::Transport(err.to_string())),
        Err(err) => Err(ForecastError::Json(err.to_string())),
    }
}

pub fn parse_tonight_low(body: &[u8]) -> Result<i32, ForecastError> {
    read_tonight_low(body)
}

/// Body reader that runs `before_read` ahead of every read.
///
/// Firmware uses the hook to feed its watchdog and to enforce an overall
/// download deadline. An error from the hook aborts the download.
pub struct GuardedReader<R, F> {
    inner: R,
    before_read: F,
}

impl<R, F> GuardedReader<R, F>
where
    R: Read,
    F: FnMut() -> io::Result<()>,
{
    pub fn new(inner: R, before_read: F) -> Self {
        Self { inner, before_read }
    }
}

impl<R, F> Read for GuardedReader<R, F>
where
    R: Read,
    F: FnMut() -> io::Result<()>,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (self.before_read)()?;
        self.inner.read(buf)
    }
}

struct CountingReader<R> {
    inner: R,
    count: usize,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.count += read;
        Ok(read)
    }
}

// Fractions are truncated toward zero; the device only reasons in whole degrees.
fn whole_degrees(value: f64) -> Result<i32, ForecastError> {
    if value.is_finite() && (-100.0..=100.0).contains(&value) {
        Ok(value.trunc() as i32)
    } else {
        Err(ForecastError::InvalidTemperature(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"location":{"name":"London","region":"City of London, Greater London"},
"current":{"temp_c":17.0,"is_day":1},
"forecast":{"forecastday":[{"date":"2021-05-02","day":{"maxtemp_c":18.2,"mintemp_c":9.4,"avgtemp_c":13.1},
"astro":{"sunrise":"05:34 AM"},"hour":[{"time":"2021-05-02 00:00","temp_c":10.1}]}]}}"#;

    /// Hands out the body a few bytes at a time, like a slow socket.
    struct Trickle<'a> {
        body: &'a [u8],
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(self.body.len()).min(16);
            buf[..len].copy_from_slice(&self.body[..len]);
            self.body = &self.body[len..];
            Ok(len)
        }
    }

    #[test]
    fn reads_first_day_minimum() {
        assert_eq!(parse_tonight_low(SAMPLE.as_bytes()), Ok(9));
    }

    #[test]
    fn ignores_mintemp_outside_todays_forecast() {
        let body = br#"{"history":{"day":{"mintemp_c":30.0}},
            "forecast":{"forecastday":[{"day":{"mintemp_c":5.0}},{"day":{"mintemp_c":-8.0}}]}}"#;

        assert_eq!(parse_tonight_low(body), Ok(5));
    }

    #[test]
    fn truncates_negative_values_toward_zero() {
        let body = br#"{"forecast":{"forecastday":[{"day":{"mintemp_c":-2.7}}]}}"#;
        assert_eq!(parse_tonight_low(body), Ok(-2));

        let body = br#"{"forecast":{"forecastday":[{"day":{"mintemp_c": -0.4 }}]}}"#;
        assert_eq!(parse_tonight_low(body), Ok(0));
    }

    #[test]
    fn missing_forecast_is_reported() {
        let body = br#"{"error":{"code":2006,"message":"API key is invalid."}}"#;
        assert_eq!(parse_tonight_low(body), Err(ForecastError::MissingField));

        let body = br#"{"forecast":{"forecastday":[]}}"#;
        assert_eq!(parse_tonight_low(body), Err(ForecastError::MissingField));
    }

    #[test]
    fn non_numeric_value_is_a_json_error() {
        let body = br#"{"forecast":{"forecastday":[{"day":{"mintemp_c":"cold"}}]}}"#;
        assert!(matches!(
            parse_tonight_low(body),
            Err(ForecastError::Json(_))
        ));

        assert!(matches!(
            parse_tonight_low(b"<html>502 Bad Gateway</html>"),
            Err(ForecastError::Json(_))
        ));
    }

    #[test]
    fn implausible_value_is_rejected() {
        let body = br#"{"forecast":{"forecastday":[{"day":{"mintemp_c":250.0}}]}}"#;
        assert_eq!(
            parse_tonight_low(body),
            Err(ForecastError::InvalidTemperature(250.0))
        );
    }

    #[test]
    fn oversized_body_stops_reading() {
        let body = vec![b' '; MAX_FORECAST_BODY + 1];
        assert_eq!(
            parse_tonight_low(&body),
            Err(ForecastError::BodyTooLarge {
                limit: MAX_FORECAST_BODY
            })
        );
    }

    #[test]
    fn guard_runs_before_every_read() {
        let mut calls = 0;
        let reader = GuardedReader::new(
            Trickle {
                body: SAMPLE.as_bytes(),
            },
            || {
                calls += 1;
                Ok(())
            },
        );

        assert_eq!(read_tonight_low(reader), Ok(9));
        assert!(calls > SAMPLE.len() / 16);
    }

    #[test]
    fn guard_error_aborts_download() {
        let mut calls = 0;
        let reader = GuardedReader::new(
            Trickle {
                body: SAMPLE.as_bytes(),
            },
            || {
                calls += 1;
                if calls > 3 {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "deadline passed"))
                } else {
                    Ok(())
                }
            },
        );

        assert!(matches!(
            read_tonight_low(reader),
            Err(ForecastError::Transport(_))
        ));
        assert_eq!(calls, 4);
    }

    #[test]
    fn request_url_encodes_query_values() {
        let config = ForecastConfig {
            api_key: "ab&c".to_string(),
            location: "St Albans".to_string(),
            ..ForecastConfig::default()
        };

        assert_eq!(
            config.request_url().unwrap(),
            "http://api.weatherapi.com/v1/forecast.json?key=ab%26c&q=St%20Albans&days=1&aqi=no&alerts=no"
        );
    }

    #[test]
    fn unconfigured_source_has_no_url() {
        assert_eq!(
            ForecastConfig::default().request_url(),
            Err(ForecastError::NotConfigured)
        );
        assert_eq!(check_status(503), Err(ForecastError::HttpStatus(503)));
        assert_eq!(check_status(200), Ok(()));
    }
}
