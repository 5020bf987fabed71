//! Cost Meter
//!
//! Prices every LLM completion and keeps running totals per agent and per
//! model. Money is `Decimal`; prices are USD per 1K tokens.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Per-1K-token pricing for a model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_1k: Decimal,
    pub output_per_1k: Decimal,
}

impl ModelPricing {
    pub const FREE: Self = Self::new(Decimal::ZERO, Decimal::ZERO);

    pub const fn new(input_per_1k: Decimal, output_per_1k: Decimal) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Cost of one call
    pub fn cost(&self, tokens_in: u32, tokens_out: u32) -> Decimal {
        (Decimal::from(tokens_in) * self.input_per_1k
            + Decimal::from(tokens_out) * self.output_per_1k)
            / dec!(1000)
    }
}

/// Model name to price lookup
///
/// Lookup tries the exact key, then the model with its provider prefix
/// stripped (`openai/gpt-4o` -> `gpt-4o`), then the provider alone
/// (`ollama/llama3.2` -> `ollama`), then the fallback price.
#[derive(Clone, Debug)]
pub struct PriceTable {
    prices: HashMap<String, ModelPricing>,
    fallback: ModelPricing,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PriceTable {
    pub fn with_defaults() -> Self {
        let mut table = Self::empty();
        table.set("gpt-5", ModelPricing::new(dec!(0.015), dec!(0.045)));
        table.set("gpt-4o", ModelPricing::new(dec!(0.005), dec!(0.015)));
        table.set("gpt-4-turbo", ModelPricing::new(dec!(0.01), dec!(0.03)));
        table.set("gpt-3.5-turbo", ModelPricing::new(dec!(0.0005), dec!(0.0015)));
        table.set("claude-3-haiku", ModelPricing::new(dec!(0.00025), dec!(0.00125)));
        table.set("ollama", ModelPricing::FREE);
        table.set("scripted", ModelPricing::FREE);
        table.fallback = ModelPricing::new(dec!(0.015), dec!(0.045));
        table
    }

    /// Table where every model is free unless priced explicitly
    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
            fallback: ModelPricing::FREE,
        }
    }

    pub fn set(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.prices.insert(model.into(), pricing);
    }

    #[must_use]
    pub const fn with_fallback(mut self, fallback: ModelPricing) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn get(&self, model: &str) -> ModelPricing {
        if let Some(price) = self.prices.get(model) {
            return *price;
        }
        if let Some((provider, name)) = model.split_once('/') {
            if let Some(price) = self.prices.get(name).or_else(|| self.prices.get(provider)) {
                return *price;
            }
        }
        self.fallback
    }
}

/// Totals for one agent or one model
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageBreakdown {
    pub calls: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost: Decimal,
}

impl UsageBreakdown {
    fn add(&mut self, tokens_in: u32, tokens_out: u32, cost: Decimal) {
        self.calls += 1;
        self.tokens_in += u64::from(tokens_in);
        self.tokens_out += u64::from(tokens_out);
        self.cost += cost;
    }

    pub const fn tokens(&self) -> u64 {
        self.tokens_in + self.tokens_out
    }
}

/// Snapshot of everything metered so far
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostSummary {
    pub calls: u64,
    pub tokens: u64,
    pub cost: Decimal,
    pub avg_cost_per_call: Decimal,
    pub by_agent: BTreeMap<String, UsageBreakdown>,
    pub by_model: BTreeMap<String, UsageBreakdown>,
}

#[derive(Debug, Default)]
struct Totals {
    all: UsageBreakdown,
    by_agent: BTreeMap<String, UsageBreakdown>,
    by_model: BTreeMap<String, UsageBreakdown>,
}

/// Running cost totals shared by all agents
///
/// Totals never decrease.
#[derive(Debug, Default)]
pub struct CostMeter {
    prices: PriceTable,
    totals: Mutex<Totals>,
}

impl CostMeter {
    pub fn new(prices: PriceTable) -> Self {
        Self {
            prices,
            totals: Mutex::new(Totals::default()),
        }
    }

    pub const fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Record one completed call and return its cost
    pub fn record(&self, agent: &str, model: &str, tokens_in: u32, tokens_out: u32) -> Decimal {
        let cost = self.prices.get(model).cost(tokens_in, tokens_out);

        let mut totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        totals.all.add(tokens_in, tokens_out, cost);
        totals
            .by_agent
            .entry(agent.to_string())
            .or_default()
            .add(tokens_in, tokens_out, cost);
        totals
            .by_model
            .entry(model.to_string())
            .or_default()
            .add(tokens_in, tokens_out, cost);
        drop(totals);

        tracing::debug!(agent, model, tokens_in, tokens_out, %cost, "Metered LLM call");
        cost
    }

    pub fn summary(&self) -> CostSummary {
        let totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        let avg_cost_per_call = if totals.all.calls == 0 {
            Decimal::ZERO
        } else {
            totals.all.cost / Decimal::from(totals.all.calls)
        };
        CostSummary {
            calls: totals.all.calls,
            tokens: totals.all.tokens(),
            cost: totals.all.cost,
            avg_cost_per_call,
            by_agent: totals.by_agent.clone(),
            by_model: totals.by_model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_lookup_order() {
        let table = PriceTable::with_defaults();
        assert_eq!(table.get("gpt-4o").input_per_1k, dec!(0.005));
        assert_eq!(table.get("openai/gpt-4o").input_per_1k, dec!(0.005));
        assert_eq!(table.get("ollama/llama3.2"), ModelPricing::FREE);
        // unknown hosted models are charged at the fallback price
        assert_eq!(table.get("mystery-model").output_per_1k, dec!(0.045));
        assert_eq!(PriceTable::empty().get("gpt-4o"), ModelPricing::FREE);
    }

    #[test]
    fn test_cost_per_1k_tokens() {
        let price = ModelPricing::new(dec!(0.005), dec!(0.015));
        assert_eq!(price.cost(1000, 1000), dec!(0.020));
        assert_eq!(price.cost(500, 0), dec!(0.0025));
    }

    #[test]
    fn test_meter_breakdowns() {
        let meter = CostMeter::new(PriceTable::with_defaults());
        meter.record("Maurice", "gpt-4o", 1000, 1000);
        meter.record("Maurice", "gpt-4o", 1000, 0);
        meter.record("Greg", "ollama/llama3.2", 400, 100);

        let summary = meter.summary();
        assert_eq!(summary.calls, 3);
        assert_eq!(summary.tokens, 3500);
        assert_eq!(summary.cost, dec!(0.025));
        assert_eq!(summary.by_agent["Maurice"].calls, 2);
        assert_eq!(summary.by_agent["Greg"].cost, Decimal::ZERO);
        assert_eq!(summary.by_model["gpt-4o"].tokens(), 3000);
        assert!(summary.avg_cost_per_call > Decimal::ZERO);
    }

    #[test]
    fn test_totals_never_decrease() {
        let meter = CostMeter::default();
        let mut last = meter.summary();
        for i in 0..5 {
            meter.record("a", "gpt-5", i * 10, i);
            let now = meter.summary();
            assert!(now.calls > last.calls);
            assert!(now.tokens >= last.tokens);
            assert!(now.cost >= last.cost);
            last = now;
        }
    }
}
