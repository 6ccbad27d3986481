use anyhow::{bail, Context, Result};

use pricing_core::resync::{
    DEFAULT_PRICE_TOLERANCE, DEFAULT_RESYNC_CONCURRENCY, MAX_RESYNC_CONCURRENCY,
};

/// Output format for log lines on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Tracing filter directive (PRICING_LOG)
    pub log_level: String,
    /// pretty or json (PRICING_LOG_FORMAT)
    pub log_format: LogFormat,
    /// Resync items in flight (PRICING_RESYNC_CONCURRENCY)
    pub resync_concurrency: usize,
    /// Sell price tolerance for changed-only resync (PRICING_PRICE_TOLERANCE)
    pub price_tolerance: f64,
    /// Name written into workbook locks (PRICING_USER, then USER)
    pub user: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let log_format = match std::env::var("PRICING_LOG_FORMAT")
            .unwrap_or_else(|_| "pretty".to_string())
            .to_lowercase()
            .as_str()
        {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => bail!("PRICING_LOG_FORMAT must be pretty or json, got {other}"),
        };

        let resync_concurrency = match std::env::var("PRICING_RESYNC_CONCURRENCY") {
            Ok(v) => {
                let n: usize = v
                    .parse()
                    .with_context(|| format!("PRICING_RESYNC_CONCURRENCY is not a number: {v}"))?;
                if n == 0 || n > MAX_RESYNC_CONCURRENCY {
                    bail!(
                        "PRICING_RESYNC_CONCURRENCY must be between 1 and {MAX_RESYNC_CONCURRENCY}, got {n}"
                    );
                }
                n
            }
            Err(_) => DEFAULT_RESYNC_CONCURRENCY,
        };

        let price_tolerance = match std::env::var("PRICING_PRICE_TOLERANCE") {
            Ok(v) => {
                let t: f64 = v
                    .parse()
                    .with_context(|| format!("PRICING_PRICE_TOLERANCE is not a number: {v}"))?;
                if !t.is_finite() || t < 0.0 {
                    bail!("PRICING_PRICE_TOLERANCE must be a non-negative number, got {v}");
                }
                t
            }
            Err(_) => DEFAULT_PRICE_TOLERANCE,
        };

        Ok(Self {
            log_level: std::env::var("PRICING_LOG").unwrap_or_else(|_| "info".to_string()),
            log_format,
            resync_concurrency,
            price_tolerance,
            user: std::env::var("PRICING_USER")
                .or_else(|_| std::env::var("USER"))
                .unwrap_or_else(|_| "unknown".to_string()),
        })
    }
}
