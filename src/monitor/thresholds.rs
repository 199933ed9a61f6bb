use serde::Serialize;

const ERROR_RATE_CRITICAL: f64 = 10.0;
const ERROR_RATE_WARNING: f64 = 5.0;
const LATENCY_CRITICAL_MS: f64 = 5000.0;
const LATENCY_WARNING_MS: f64 = 2000.0;
const UPTIME_CRITICAL: f64 = 50.0;
const UPTIME_WARNING: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThresholdAlert {
    pub metric: &'static str,
    pub level: AlertLevel,
    pub value: f64,
    pub threshold: f64,
}

/// Threshold classification; informational only
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThresholdReport {
    pub alerts: Vec<ThresholdAlert>,
}

impl ThresholdReport {
    /// Most severe level raised, if any
    pub fn level(&self) -> Option<AlertLevel> {
        self.alerts.iter().map(|a| a.level).max()
    }

    pub fn is_critical(&self) -> bool {
        self.level() == Some(AlertLevel::Critical)
    }

    /// Level raised for one metric
    pub fn level_for(&self, metric: &str) -> Option<AlertLevel> {
        self.alerts
            .iter()
            .find(|a| a.metric == metric)
            .map(|a| a.level)
    }

    pub(super) fn evaluate(
        error_rate_percent: f64,
        average_latency_ms: f64,
        uptime_ratio_percent: Option<f64>,
    ) -> Self {
        let mut alerts = Vec::new();

        if error_rate_percent >= ERROR_RATE_CRITICAL {
            alerts.push(alert("error_rate", AlertLevel::Critical, error_rate_percent, ERROR_RATE_CRITICAL));
        } else if error_rate_percent >= ERROR_RATE_WARNING {
            alerts.push(alert("error_rate", AlertLevel::Warning, error_rate_percent, ERROR_RATE_WARNING));
        }

        if average_latency_ms >= LATENCY_CRITICAL_MS {
            alerts.push(alert("latency", AlertLevel::Critical, average_latency_ms, LATENCY_CRITICAL_MS));
        } else if average_latency_ms >= LATENCY_WARNING_MS {
            alerts.push(alert("latency", AlertLevel::Warning, average_latency_ms, LATENCY_WARNING_MS));
        }

        if let Some(ratio) = uptime_ratio_percent {
            if ratio < UPTIME_CRITICAL {
                alerts.push(alert("uptime", AlertLevel::Critical, ratio, UPTIME_CRITICAL));
            } else if ratio < UPTIME_WARNING {
                alerts.push(alert("uptime", AlertLevel::Warning, ratio, UPTIME_WARNING));
            }
        }

        Self { alerts }
    }
}

fn alert(metric: &'static str, level: AlertLevel, value: f64, threshold: f64) -> ThresholdAlert {
    ThresholdAlert {
        metric,
        level,
        value,
        threshold,
    }
}
