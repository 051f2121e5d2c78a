//! Object detection over device screenshots.
//!
//! The [`Detector`] trait is the seam between the bot and the vision
//! service. [`HostedDetector`] captures a screenshot through a
//! [`ScreenCapture`] and posts it to a hosted inference endpoint.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::{Client, multipart};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::detection::Detection;
use crate::io::config::VisionConfig;

/// Labeled detections for the current screen of a device.
pub trait Detector {
    fn detect(&self, device_id: &str) -> Result<Vec<Detection>>;
}

/// Raw PNG screenshot of a device.
pub trait ScreenCapture {
    fn capture_png(&self, device_id: &str) -> Result<Vec<u8>>;
}

/// Inference response: `{"predictions": [{"class", "x", "y", "width", "height", "confidence"}]}`.
#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(rename = "class")]
    class_name: String,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    confidence: f64,
}

impl From<Prediction> for Detection {
    fn from(p: Prediction) -> Self {
        Detection::new(p.class_name, p.x, p.y, p.width, p.height, p.confidence)
    }
}

/// Parse an inference response body into detections.
pub fn parse_predictions(body: &str) -> Result<Vec<Detection>> {
    let response: InferenceResponse =
        serde_json::from_str(body).context("parse inference response")?;
    Ok(response
        .predictions
        .into_iter()
        .map(Detection::from)
        .collect())
}

/// Detector backed by a hosted model (`{endpoint}/{model_id}?api_key=...`).
pub struct HostedDetector<C> {
    client: Client,
    url: String,
    api_key: String,
    capture: C,
}

impl<C: ScreenCapture> HostedDetector<C> {
    pub fn new(cfg: &VisionConfig, model_id: &str, capture: C) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build http client")?;
        let url = format!(
            "{}/{}",
            cfg.endpoint.trim_end_matches('/'),
            model_id.trim_matches('/')
        );
        Ok(Self {
            client,
            url,
            api_key: cfg.api_key.clone(),
            capture,
        })
    }
}

impl<C: ScreenCapture> Detector for HostedDetector<C> {
    #[instrument(skip_all, fields(device = device_id, url = %self.url))]
    fn detect(&self, device_id: &str) -> Result<Vec<Detection>> {
        let png = self.capture.capture_png(device_id)?;
        let part = multipart::Part::bytes(png)
            .file_name("screenshot.png")
            .mime_str("image/png")
            .context("build multipart part")?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.url)
            .query(&[("api_key", self.api_key.as_str())])
            .multipart(form)
            .send()
            .context("send inference request")?;
        let status = response.status();
        let body = response.text().context("read inference response")?;
        if !status.is_success() {
            bail!("inference request failed with {status}: {}", body.trim());
        }
        let detections = parse_predictions(&body)?;
        debug!(count = detections.len(), "detections received");
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_predictions_and_clamps_confidence() {
        let body = r#"{
            "time": 0.04,
            "image": {"width": 640, "height": 480},
            "predictions": [
                {"class": "in_city", "x": 320.5, "y": 20.0, "width": 40, "height": 12, "confidence": 0.93},
                {"class": "farm", "x": 100, "y": 200, "width": 30, "height": 30, "confidence": 1.2, "class_id": 4}
            ]
        }"#;
        let detections = parse_predictions(body).expect("parse");
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_name(), "in_city");
        assert_eq!(detections[0].center().x, 320);
        assert_eq!(detections[1].confidence(), 1.0);
    }

    #[test]
    fn missing_predictions_means_empty_screen() {
        assert!(parse_predictions("{}").expect("parse").is_empty());
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_predictions("<html>").is_err());
    }
}
