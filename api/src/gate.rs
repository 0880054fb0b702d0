//! Request classification: warmup probe, real request, or wrong method.

use std::sync::LazyLock;

use axum::http::{HeaderMap, Method};
use regex::Regex;
use serde_json::Value;

use crate::error::AppError;

pub const WARMUP_HEADER: &str = "x-warmup";
pub const CRON_HEADER: &str = "x-appengine-cron";

static RAW_WARMUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"warmup"\s*:\s*(?:true|1|"(?:true|1|yes|on)")"#).expect("valid warmup regex")
});

/// Independent warmup signals. Any one of them classifies the request as a
/// warmup probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmupSignals {
    /// `x-warmup` header, empty or truthy. Lets schedulers flag a probe
    /// without sending a body at all.
    pub header_flag: bool,
    /// App Engine cron requests carry this header and no JSON.
    pub cron_header: bool,
    /// `?warmup`, `?warmup=` or a truthy `?warmup=1`.
    pub query_param: bool,
    /// `warmup` key in the JSON body. A present-but-null or empty value
    /// counts, since some proxies strip the value and keep the key.
    pub body_field: bool,
    /// Truthy `"warmup"` field found by substring when the body is not
    /// valid JSON.
    pub raw_body_match: bool,
    /// `mode: "warmup"` in the JSON body.
    pub warmup_mode: bool,
}

impl WarmupSignals {
    pub fn detect(
        headers: &HeaderMap,
        query: Option<&str>,
        raw_body: &[u8],
        body: Option<&Value>,
    ) -> Self {
        let header_flag = headers
            .get(WARMUP_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().is_empty() || is_truthy_str(v));
        let cron_header = headers
            .get(CRON_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| !is_falsy_str(v));
        let query_param = query.is_some_and(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .any(|(key, value)| key == "warmup" && (value.trim().is_empty() || is_truthy_str(&value)))
        });
        let body_field = body
            .and_then(|b| b.as_object())
            .and_then(|map| map.get("warmup"))
            .is_some_and(|value| match value {
                Value::Null => true,
                Value::String(s) if s.trim().is_empty() => true,
                other => is_truthy(other),
            });
        let raw_body_match = body.is_none()
            && std::str::from_utf8(raw_body).is_ok_and(|raw| RAW_WARMUP_RE.is_match(raw));
        let warmup_mode = body
            .and_then(|b| b.get("mode"))
            .and_then(Value::as_str)
            .is_some_and(|mode| mode.trim().eq_ignore_ascii_case("warmup"));

        Self {
            header_flag,
            cron_header,
            query_param,
            body_field,
            raw_body_match,
            warmup_mode,
        }
    }

    pub fn any(&self) -> bool {
        self.header_flag
            || self.cron_header
            || self.query_param
            || self.body_field
            || self.raw_body_match
            || self.warmup_mode
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub warmup: bool,
    pub signals: WarmupSignals,
}

/// Classify a request. Only POST, or a GET carrying a warmup signal, passes.
pub fn classify(method: &Method, signals: WarmupSignals) -> Result<GateDecision, AppError> {
    let warmup = signals.any();
    if *method == Method::POST || (*method == Method::GET && warmup) {
        Ok(GateDecision { warmup, signals })
    } else {
        Err(AppError::MethodNotAllowed)
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => is_truthy_str(s),
        _ => false,
    }
}

pub fn is_truthy_str(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "y" | "on"
    )
}

fn is_falsy_str(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "no" | "n" | "off"
    )
}
