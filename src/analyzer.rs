mod window;

#[cfg(test)]
mod tests;

pub use window::SampleWindow;

use crate::config::ChannelConfig;
use crate::reading::Sample;

/// Change between the first and last valid reading of a full window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trend {
    pub first_temp: f64,
    pub last_temp: f64,
    pub delta: f64,
    pub elapsed_minutes: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Window has not filled up yet.
    InsufficientData { len: usize, capacity: usize },
    /// Window is full but holds fewer than two real temperatures.
    InsufficientValidData { valid: usize },
    Alert(Trend),
    NoAlert(Trend),
}

impl Decision {
    pub fn is_alert(&self) -> bool {
        matches!(self, Decision::Alert(_))
    }

    pub fn trend(&self) -> Option<&Trend> {
        match self {
            Decision::Alert(trend) | Decision::NoAlert(trend) => Some(trend),
            _ => None,
        }
    }
}

/// Sliding-window swing/stall detector for a single channel. Owned by the
/// channel's consumer; never shared.
#[derive(Debug)]
pub struct WindowAnalyzer {
    config: ChannelConfig,
    window: SampleWindow,
}

impl WindowAnalyzer {
    pub fn new(config: ChannelConfig) -> Self {
        let window = SampleWindow::new(config.window_capacity);
        Self { config, window }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn window(&self) -> &SampleWindow {
        &self.window
    }

    /// Appends `sample` and re-evaluates the alert condition against the
    /// current window contents.
    pub fn evaluate(&mut self, sample: Sample) -> Decision {
        self.window.push(sample);

        if !self.window.is_full() {
            return Decision::InsufficientData {
                len: self.window.len(),
                capacity: self.window.capacity(),
            };
        }

        // First/last are taken by position among the non-gap entries, not
        // min/max. Reordering the same readings can change the delta.
        let valid = self.window.valid_temperatures();
        let (first_temp, last_temp) = match (valid.first(), valid.last()) {
            (Some(first), Some(last)) if valid.len() >= 2 => (*first, *last),
            _ => return Decision::InsufficientValidData { valid: valid.len() },
        };

        let elapsed_minutes = self.window.span_minutes().unwrap_or(0.0);
        let delta = (first_temp - last_temp).abs();
        let trend = Trend {
            first_temp,
            last_temp,
            delta,
            elapsed_minutes,
        };

        let alert = delta >= self.config.alert_threshold
            && elapsed_minutes <= self.config.time_window_minutes;
        if alert {
            Decision::Alert(trend)
        } else {
            Decision::NoAlert(trend)
        }
    }
}

/// Emits the log line for a decision. Every full-window verdict is logged at
/// info so near-threshold trends stay visible.
pub fn report(config: &ChannelConfig, decision: &Decision) {
    match decision {
        Decision::InsufficientData { len, capacity } => {
            tracing::debug!(channel = %config.name, len, capacity, "window filling");
        }
        Decision::InsufficientValidData { valid } => {
            tracing::warn!(
                channel = %config.name,
                valid,
                "Not enough valid temperatures for {}",
                config.name
            );
        }
        Decision::NoAlert(trend) | Decision::Alert(trend) => {
            let alert = decision.is_alert();
            tracing::info!(
                channel = %config.name,
                first_temp = trend.first_temp,
                last_temp = trend.last_temp,
                delta = trend.delta,
                elapsed_minutes = trend.elapsed_minutes,
                alert,
                "{} - First Temp: {}, Last Temp: {}, Time Difference: {} minutes",
                config.name,
                trend.first_temp,
                trend.last_temp,
                trend.elapsed_minutes
            );
            if alert {
                tracing::info!(
                    channel = %config.name,
                    delta = trend.delta,
                    threshold = config.alert_threshold,
                    alert = true,
                    "{} Alert: Temperature change >= {}°F in {} minutes.",
                    config.name,
                    config.alert_threshold,
                    trend.elapsed_minutes
                );
            }
        }
    }
}
