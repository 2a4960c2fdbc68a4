//! Trading-signal types exchanged with the remote signal service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalSide {
    Buy,
    Sell,
    Hold,
}

impl SignalSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSide::Buy => "BUY",
            SignalSide::Sell => "SELL",
            SignalSide::Hold => "HOLD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BUY" => Some(SignalSide::Buy),
            "SELL" => Some(SignalSide::Sell),
            "HOLD" => Some(SignalSide::Hold),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub id: String,
    pub symbol: String,
    pub timeframe: String,
    pub side: SignalSide,
    pub price: f64,
    pub confidence: f64,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    pub generated_at: DateTime<Utc>,
}

/// One simulated trade sequence produced by a forward test of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardTestSequence {
    pub sequence_id: String,
    pub symbol: String,
    pub timeframe: String,
    pub model_version: String,
    pub entry_price: f64,
    #[serde(default)]
    pub exit_price: Option<f64>,
    pub side: SignalSide,
    #[serde(default)]
    pub pnl_percent: Option<f64>,
    pub status: String,
    pub opened_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalQuery {
    pub symbol: Option<String>,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainCommand {
    pub symbol: String,
    pub timeframe: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainAck {
    pub job_id: String,
    pub status: String,
}

pub const ALLOWED_TIMEFRAMES: [&str; 7] = ["1m", "5m", "15m", "30m", "1h", "4h", "1d"];

/// Uppercases and checks a symbol such as `btcusdt` or `XAU/USD`.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().to_uppercase();
    let valid = !symbol.is_empty()
        && symbol.len() <= 20
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '/' || c == '-' || c == '_');
    valid.then_some(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" btcusdt "), Some("BTCUSDT".to_string()));
        assert_eq!(normalize_symbol("xau/usd"), Some("XAU/USD".to_string()));
        assert_eq!(normalize_symbol(""), None);
        assert_eq!(normalize_symbol("BTC;DROP"), None);
    }

    #[test]
    fn test_signal_deserializes_from_service_json() {
        let raw = r#"{
            "id": "sig-1",
            "symbol": "XAUUSD",
            "timeframe": "15m",
            "side": "BUY",
            "price": 2350.5,
            "confidence": 0.82,
            "generated_at": "2026-10-01T12:00:00Z"
        }"#;
        let signal: TradingSignal = serde_json::from_str(raw).unwrap();
        assert_eq!(signal.side, SignalSide::Buy);
        assert!(signal.stop_loss.is_none());
    }
}
