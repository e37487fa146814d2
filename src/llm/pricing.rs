use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

/// USD per million tokens.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    #[serde(rename = "input")]
    pub input_per_million: f64,
    #[serde(rename = "output")]
    pub output_per_million: f64,
}

#[derive(Debug, Default)]
pub struct PriceTable {
    models: HashMap<String, ModelPrice>,
}

#[derive(Deserialize)]
struct PricingFile {
    models: HashMap<String, ModelPrice>,
}

impl PriceTable {
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        let file: PricingFile = serde_json::from_str(data)?;
        Ok(Self { models: file.models })
    }

    /// First non-empty table among `PRICING_JSON_PATH`, `data/pricing.json`
    /// relative to the working directory, then the crate's own copy.
    pub fn load() -> Self {
        let env_path = std::env::var("PRICING_JSON_PATH").unwrap_or_default();
        let candidates = [
            env_path.as_str(),
            "data/pricing.json",
            concat!(env!("CARGO_MANIFEST_DIR"), "/data/pricing.json"),
        ];

        for path in candidates.iter().filter(|p| !p.is_empty()) {
            match std::fs::read_to_string(Path::new(path)).map(|data| Self::from_json(&data)) {
                Ok(Ok(table)) if !table.models.is_empty() => {
                    tracing::debug!(path, models = table.models.len(), "pricing table loaded");
                    return table;
                }
                Ok(Err(e)) => tracing::warn!(path, error = %e, "ignoring malformed pricing table"),
                _ => {}
            }
        }

        tracing::warn!("no pricing table found, model costs will be recorded as $0.00");
        Self::default()
    }

    pub fn price(&self, model: &str) -> Option<ModelPrice> {
        self.models.get(model).copied()
    }

    /// Cost of one call; unknown models cost nothing.
    pub fn cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        self.price(model).map_or(0.0, |price| {
            (f64::from(input_tokens) * price.input_per_million
                + f64::from(output_tokens) * price.output_per_million)
                / 1_000_000.0
        })
    }
}

pub static PRICES: LazyLock<PriceTable> = LazyLock::new(PriceTable::load);

/// Where a provider's API is served, for `server.*` span attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub host: &'static str,
    pub port: u16,
}

pub fn endpoint(provider: &str) -> Endpoint {
    let (host, port) = match provider {
        "openai" => ("api.openai.com", 443),
        "anthropic" => ("api.anthropic.com", 443),
        "google" => ("generativelanguage.googleapis.com", 443),
        "ollama" => ("localhost", 11434),
        _ => ("unknown", 443),
    };
    Endpoint { host, port }
}
