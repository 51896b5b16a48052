use serde::{Deserialize, Serialize};

const TOKENS_PER_RATE_UNIT: f64 = 1_000_000.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input: u32,
    pub output: u32,
    pub cache_read: u32,
    pub cache_write: u32,
    pub total_tokens: u32,
    pub cost: Cost,
}

impl Usage {
    /// Compute the dollar cost from the model's per-million-token rate table.
    ///
    /// Adapters call this before pushing the terminal `Done` event.
    pub fn finalize_cost(&mut self, rates: &ModelCost) {
        let input = f64::from(self.input) * rates.input / TOKENS_PER_RATE_UNIT;
        let output = f64::from(self.output) * rates.output / TOKENS_PER_RATE_UNIT;
        let cache_read = f64::from(self.cache_read) * rates.cache_read / TOKENS_PER_RATE_UNIT;
        let cache_write = f64::from(self.cache_write) * rates.cache_write / TOKENS_PER_RATE_UNIT;

        self.cost = Cost {
            input,
            output,
            cache_read,
            cache_write,
            total: input + output + cache_read + cache_write,
        };
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Cost {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
    pub total: f64,
}

/// Per-million-token dollar rates for the four token classes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelCost {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
}

impl ModelCost {
    pub const ZERO: ModelCost = ModelCost {
        input: 0.0,
        output: 0.0,
        cache_read: 0.0,
        cache_write: 0.0,
    };
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    Stop,
    Length,
    ToolUse,
    Error,
    Aborted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_cost_sums_all_four_rate_classes() {
        let mut usage = Usage {
            input: 1_000_000,
            output: 500_000,
            cache_read: 2_000_000,
            cache_write: 100_000,
            total_tokens: 3_600_000,
            cost: Cost::default(),
        };

        let rates = ModelCost {
            input: 3.0,
            output: 15.0,
            cache_read: 0.3,
            cache_write: 3.75,
        };

        usage.finalize_cost(&rates);

        assert!((usage.cost.input - 3.0).abs() < 1e-9);
        assert!((usage.cost.output - 7.5).abs() < 1e-9);
        assert!((usage.cost.cache_read - 0.6).abs() < 1e-9);
        assert!((usage.cost.cache_write - 0.375).abs() < 1e-9);
        assert!((usage.cost.total - 11.475).abs() < 1e-9);
    }

    #[test]
    fn finalize_cost_on_zero_rates_is_zero() {
        let mut usage = Usage {
            input: 123,
            output: 456,
            ..Default::default()
        };
        usage.finalize_cost(&ModelCost::ZERO);
        assert_eq!(usage.cost.total, 0.0);
    }
}
