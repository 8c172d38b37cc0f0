// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! af-cost
#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Plan model
// ---------------------------------------------------------------------------

/// What a model step is asked to do; bounds the output-token heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Classify/route with a short answer.
    Routing,
    /// Pull structured data out of given context.
    Extraction,
    /// Produce prose or code.
    Generation,
    /// Multi-step reasoning with long outputs.
    Reasoning,
}

impl StepKind {
    /// Capped output-token estimate for this kind of step.
    #[must_use]
    pub fn output_token_cap(self) -> u64 {
        match self {
            Self::Routing => 128,
            Self::Extraction => 512,
            Self::Generation => 2048,
            Self::Reasoning => 4096,
        }
    }
}

/// Declared cost model of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ToolCostModel {
    /// Fixed price per invocation.
    Flat {
        /// Dollars per call.
        dollars: f64,
    },
    /// Priced by runtime.
    PerSecond {
        /// Dollars per second.
        rate: f64,
        /// Expected runtime in seconds.
        estimated_seconds: f64,
    },
    /// Priced by declared usage units.
    PerUsage {
        /// Dollars per unit.
        rate: f64,
        /// Expected units consumed.
        estimated_usages: f64,
    },
}

impl ToolCostModel {
    /// Expected dollars for one invocation.
    #[must_use]
    pub fn expected_dollars(&self) -> f64 {
        match self {
            Self::Flat { dollars } => *dollars,
            Self::PerSecond {
                rate,
                estimated_seconds,
            } => rate * estimated_seconds,
            Self::PerUsage {
                rate,
                estimated_usages,
            } => rate * estimated_usages,
        }
    }
}

/// One step of a workflow plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PlanStep {
    /// A model invocation.
    Model {
        /// Model reference (price-table key).
        model_ref: String,
        /// Templated prompt text.
        prompt_template: String,
        /// Context tokens the step declares it will attach.
        declared_context_tokens: u64,
        /// What the step does.
        kind: StepKind,
    },
    /// A tool invocation.
    Tool {
        /// Tool name.
        name: String,
        /// Declared cost model.
        cost: ToolCostModel,
    },
}

/// An ordered workflow plan, the estimator's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// The workflow this plan belongs to.
    pub workflow_id: String,
    /// Ordered steps.
    pub steps: Vec<PlanStep>,
}

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

/// Per-1k-token prices for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    /// Dollars per 1k input tokens.
    pub input_per_1k: f64,
    /// Dollars per 1k output tokens.
    pub output_per_1k: f64,
}

/// Model reference → price mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceTable {
    prices: BTreeMap<String, ModelPrice>,
    /// Applied when a model reference is not in the table.
    pub fallback: ModelPrice,
}

impl PriceTable {
    /// A small table with conservative defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut prices = BTreeMap::new();
        prices.insert(
            "small".to_string(),
            ModelPrice {
                input_per_1k: 0.000_25,
                output_per_1k: 0.001_25,
            },
        );
        prices.insert(
            "medium".to_string(),
            ModelPrice {
                input_per_1k: 0.003,
                output_per_1k: 0.015,
            },
        );
        prices.insert(
            "large".to_string(),
            ModelPrice {
                input_per_1k: 0.015,
                output_per_1k: 0.075,
            },
        );
        Self {
            prices,
            fallback: ModelPrice {
                input_per_1k: 0.003,
                output_per_1k: 0.015,
            },
        }
    }

    /// Insert or replace a price entry.
    pub fn insert(&mut self, model_ref: impl Into<String>, price: ModelPrice) {
        self.prices.insert(model_ref.into(), price);
    }

    /// Price for a model reference, falling back when unknown.
    #[must_use]
    pub fn price_for(&self, model_ref: &str) -> ModelPrice {
        self.prices.get(model_ref).copied().unwrap_or(self.fallback)
    }
}

impl Default for ModelPrice {
    fn default() -> Self {
        Self {
            input_per_1k: 0.0,
            output_per_1k: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Estimate
// ---------------------------------------------------------------------------

/// Cost breakdown category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    /// Model token spend.
    Model,
    /// Tool invocation spend.
    Tool,
    /// Fixed orchestration overhead.
    Overhead,
}

/// The ephemeral estimation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Total expected dollars.
    pub total: f64,
    /// Per-category breakdown.
    pub breakdown: BTreeMap<CostCategory, f64>,
    /// Confidence in `[0, 1]`; 0.5 without history.
    pub confidence: f64,
    /// When the estimate was computed.
    pub estimated_at: DateTime<Utc>,
    /// After this instant the estimate must be recomputed.
    pub valid_until: DateTime<Utc>,
}

impl CostEstimate {
    /// Whether the estimate is still usable at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.valid_until
    }
}

/// Characters per token for the prompt-length heuristic.
const CHARS_PER_TOKEN: u64 = 4;
/// Flat orchestration overhead charged per step.
const OVERHEAD_PER_STEP: f64 = 0.000_5;

/// Records relative prediction errors per `(tenant, workflow)` and turns
/// their spread into a confidence score.
#[derive(Default)]
pub struct CostHistory {
    samples: Mutex<HashMap<(String, String), Vec<f64>>>,
}

impl CostHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome: the estimate that was made and the cost actually
    /// incurred.
    pub fn record_outcome(&self, tenant_id: &str, workflow_id: &str, estimated: f64, actual: f64) {
        if estimated <= 0.0 {
            return;
        }
        let relative_error = ((actual - estimated) / estimated).abs();
        let mut samples = self.samples.lock().expect("history lock poisoned");
        samples
            .entry((tenant_id.to_string(), workflow_id.to_string()))
            .or_default()
            .push(relative_error);
    }

    /// Confidence for the pair: `1 − clamp(cv, 0, 1)` over recorded errors,
    /// 0.5 when fewer than two samples exist.
    #[must_use]
    pub fn confidence(&self, tenant_id: &str, workflow_id: &str) -> f64 {
        let samples = self.samples.lock().expect("history lock poisoned");
        let Some(errors) = samples.get(&(tenant_id.to_string(), workflow_id.to_string())) else {
            return 0.5;
        };
        if errors.len() < 2 {
            return 0.5;
        }
        let mean = errors.iter().sum::<f64>() / errors.len() as f64;
        if mean <= f64::EPSILON {
            return 1.0;
        }
        let variance =
            errors.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / errors.len() as f64;
        let cv = variance.sqrt() / mean;
        1.0 - cv.clamp(0.0, 1.0)
    }
}

/// Prices plans into [`CostEstimate`]s.
pub struct CostEstimator {
    prices: PriceTable,
    history: CostHistory,
    ttl: Duration,
}

impl CostEstimator {
    /// Create an estimator with the given price table and estimate TTL.
    #[must_use]
    pub fn new(prices: PriceTable, ttl: Duration) -> Self {
        Self {
            prices,
            history: CostHistory::new(),
            ttl,
        }
    }

    /// The estimator's prediction-error history.
    #[must_use]
    pub fn history(&self) -> &CostHistory {
        &self.history
    }

    /// Estimate a plan for a tenant.
    #[must_use]
    pub fn estimate(&self, tenant_id: &str, plan: &Plan) -> CostEstimate {
        let mut model_total = 0.0;
        let mut tool_total = 0.0;

        for step in &plan.steps {
            match step {
                PlanStep::Model {
                    model_ref,
                    prompt_template,
                    declared_context_tokens,
                    kind,
                } => {
                    let input_tokens =
                        prompt_template.len() as u64 / CHARS_PER_TOKEN + declared_context_tokens;
                    let output_tokens = kind.output_token_cap();
                    let price = self.prices.price_for(model_ref);
                    model_total += input_tokens as f64 / 1000.0 * price.input_per_1k
                        + output_tokens as f64 / 1000.0 * price.output_per_1k;
                }
                PlanStep::Tool { cost, .. } => {
                    tool_total += cost.expected_dollars();
                }
            }
        }

        let overhead = plan.steps.len() as f64 * OVERHEAD_PER_STEP;
        let mut breakdown = BTreeMap::new();
        breakdown.insert(CostCategory::Model, model_total);
        breakdown.insert(CostCategory::Tool, tool_total);
        breakdown.insert(CostCategory::Overhead, overhead);

        let now = Utc::now();
        CostEstimate {
            total: model_total + tool_total + overhead,
            breakdown,
            confidence: self.history.confidence(tenant_id, &plan.workflow_id),
            estimated_at: now,
            valid_until: now + chrono::Duration::from_std(self.ttl).unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Budgets
// ---------------------------------------------------------------------------

/// What a budget constrains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetScope {
    /// Everything the tenant runs.
    Global,
    /// One workflow.
    Workflow(String),
    /// One user.
    User(String),
}

/// Accounting period of a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPeriod {
    /// Resets daily.
    Daily,
    /// Resets monthly.
    Monthly,
}

/// A spending limit with accumulated usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    /// Owning tenant.
    pub tenant_id: String,
    /// What the budget constrains.
    pub scope: BudgetScope,
    /// Hard limit in dollars.
    pub limit_dollars: f64,
    /// Usage accumulated this period.
    pub current_usage: f64,
    /// Accounting period.
    pub period: BudgetPeriod,
}

/// Result of checking an estimate against active budgets.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BudgetCheck {
    /// The estimate fits.
    Ok,
    /// The estimate exceeds a budget; non-fatal at estimation time.
    Warning {
        /// Which scope would be exceeded.
        scope: BudgetScope,
        /// Dollars over the limit.
        overage: f64,
    },
}

/// Thread-safe budget ledger with atomic accumulation.
#[derive(Default)]
pub struct BudgetTracker {
    budgets: Mutex<HashMap<(String, BudgetScope), Budget>>,
}

impl BudgetTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace a budget.
    pub fn set_budget(&self, budget: Budget) {
        let mut budgets = self.budgets.lock().expect("budget lock poisoned");
        budgets.insert((budget.tenant_id.clone(), budget.scope.clone()), budget);
    }

    /// Snapshot a budget.
    #[must_use]
    pub fn get(&self, tenant_id: &str, scope: &BudgetScope) -> Option<Budget> {
        let budgets = self.budgets.lock().expect("budget lock poisoned");
        budgets.get(&(tenant_id.to_string(), scope.clone())).cloned()
    }

    /// All budgets of a tenant.
    #[must_use]
    pub fn for_tenant(&self, tenant_id: &str) -> Vec<Budget> {
        let budgets = self.budgets.lock().expect("budget lock poisoned");
        budgets
            .values()
            .filter(|b| b.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    /// Atomically add `amount` to a budget's usage. No-op when the budget
    /// does not exist.
    pub fn accumulate(&self, tenant_id: &str, scope: &BudgetScope, amount: f64) {
        let mut budgets = self.budgets.lock().expect("budget lock poisoned");
        if let Some(budget) = budgets.get_mut(&(tenant_id.to_string(), scope.clone())) {
            budget.current_usage += amount;
        }
    }

    /// Check an estimate against the tenant's global and workflow budgets.
    /// Returns the largest overage as a warning; the estimator never blocks.
    #[must_use]
    pub fn check_estimate(
        &self,
        tenant_id: &str,
        workflow_id: &str,
        estimate_total: f64,
    ) -> BudgetCheck {
        let budgets = self.budgets.lock().expect("budget lock poisoned");
        let mut worst: Option<(BudgetScope, f64)> = None;

        for scope in [
            BudgetScope::Global,
            BudgetScope::Workflow(workflow_id.to_string()),
        ] {
            if let Some(budget) = budgets.get(&(tenant_id.to_string(), scope.clone())) {
                let projected = budget.current_usage + estimate_total;
                if projected > budget.limit_dollars {
                    let overage = projected - budget.limit_dollars;
                    if worst.as_ref().is_none_or(|(_, w)| overage > *w) {
                        worst = Some((scope, overage));
                    }
                }
            }
        }

        match worst {
            Some((scope, overage)) => BudgetCheck::Warning { scope, overage },
            None => BudgetCheck::Ok,
        }
    }

    /// Whether starting a workflow costing `estimate_total` would break any
    /// active budget. This is the hard-admission predicate.
    #[must_use]
    pub fn would_exceed(&self, tenant_id: &str, workflow_id: &str, estimate_total: f64) -> bool {
        matches!(
            self.check_estimate(tenant_id, workflow_id, estimate_total),
            BudgetCheck::Warning { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn model_step(kind: StepKind, prompt_chars: usize, context: u64) -> PlanStep {
        PlanStep::Model {
            model_ref: "medium".into(),
            prompt_template: "x".repeat(prompt_chars),
            declared_context_tokens: context,
            kind,
        }
    }

    fn plan(steps: Vec<PlanStep>) -> Plan {
        Plan {
            workflow_id: "wf-1".into(),
            steps,
        }
    }

    fn estimator() -> CostEstimator {
        CostEstimator::new(PriceTable::with_defaults(), Duration::from_secs(60))
    }

    // -- estimation -------------------------------------------------------

    #[test]
    fn empty_plan_costs_only_nothing() {
        let est = estimator().estimate("t1", &plan(vec![]));
        assert_eq!(est.total, 0.0);
        assert_eq!(est.breakdown[&CostCategory::Model], 0.0);
        assert_eq!(est.breakdown[&CostCategory::Tool], 0.0);
        assert_eq!(est.breakdown[&CostCategory::Overhead], 0.0);
    }

    #[test]
    fn model_step_prices_input_and_capped_output() {
        // 4000 chars → 1000 input tokens, plus 1000 declared context.
        let est = estimator().estimate("t1", &plan(vec![model_step(StepKind::Routing, 4000, 1000)]));
        let price = PriceTable::with_defaults().price_for("medium");
        let expected_model = 2000.0 / 1000.0 * price.input_per_1k
            + f64::from(128u32) / 1000.0 * price.output_per_1k;
        let got = est.breakdown[&CostCategory::Model];
        assert!((got - expected_model).abs() < 1e-9, "got {got}");
    }

    #[test]
    fn output_caps_scale_with_step_kind() {
        let routing = estimator().estimate("t1", &plan(vec![model_step(StepKind::Routing, 0, 0)]));
        let reasoning =
            estimator().estimate("t1", &plan(vec![model_step(StepKind::Reasoning, 0, 0)]));
        assert!(
            reasoning.breakdown[&CostCategory::Model] > routing.breakdown[&CostCategory::Model]
        );
    }

    #[test]
    fn tool_cost_models() {
        assert_eq!(ToolCostModel::Flat { dollars: 0.25 }.expected_dollars(), 0.25);
        assert_eq!(
            ToolCostModel::PerSecond {
                rate: 0.01,
                estimated_seconds: 30.0
            }
            .expected_dollars(),
            0.3
        );
        assert_eq!(
            ToolCostModel::PerUsage {
                rate: 0.002,
                estimated_usages: 50.0
            }
            .expected_dollars(),
            0.1
        );
    }

    #[test]
    fn breakdown_sums_to_total() {
        let est = estimator().estimate(
            "t1",
            &plan(vec![
                model_step(StepKind::Generation, 2000, 500),
                PlanStep::Tool {
                    name: "search".into(),
                    cost: ToolCostModel::Flat { dollars: 0.05 },
                },
            ]),
        );
        let sum: f64 = est.breakdown.values().sum();
        assert!((est.total - sum).abs() < 1e-12);
        assert!(est.breakdown[&CostCategory::Overhead] > 0.0);
    }

    #[test]
    fn estimate_expires_after_ttl() {
        let est = estimator().estimate("t1", &plan(vec![]));
        assert!(est.is_valid_at(est.estimated_at));
        assert!(est.is_valid_at(est.valid_until));
        assert!(!est.is_valid_at(est.valid_until + chrono::Duration::seconds(1)));
    }

    #[test]
    fn unknown_model_uses_fallback_price() {
        let table = PriceTable::with_defaults();
        let price = table.price_for("never-heard-of-it");
        assert_eq!(price.input_per_1k, table.fallback.input_per_1k);
    }

    // -- confidence -------------------------------------------------------

    #[test]
    fn confidence_defaults_without_history() {
        let est = estimator().estimate("t1", &plan(vec![]));
        assert_eq!(est.confidence, 0.5);
    }

    #[test]
    fn consistent_history_raises_confidence() {
        let estimator = estimator();
        for _ in 0..5 {
            estimator.history().record_outcome("t1", "wf-1", 1.0, 1.1);
        }
        let est = estimator.estimate("t1", &plan(vec![]));
        // Identical relative errors → zero variance → full confidence.
        assert!((est.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn erratic_history_lowers_confidence() {
        let estimator = estimator();
        estimator.history().record_outcome("t1", "wf-1", 1.0, 1.01);
        estimator.history().record_outcome("t1", "wf-1", 1.0, 5.0);
        estimator.history().record_outcome("t1", "wf-1", 1.0, 1.02);
        let est = estimator.estimate("t1", &plan(vec![]));
        assert!(est.confidence < 0.5, "confidence {}", est.confidence);
        assert!(est.confidence >= 0.0);
    }

    #[test]
    fn history_is_per_workflow() {
        let estimator = estimator();
        for _ in 0..5 {
            estimator.history().record_outcome("t1", "wf-other", 1.0, 1.1);
        }
        let est = estimator.estimate("t1", &plan(vec![]));
        assert_eq!(est.confidence, 0.5);
    }

    // -- serde ------------------------------------------------------------

    #[test]
    fn plan_serde_roundtrip() {
        let p = plan(vec![
            model_step(StepKind::Extraction, 100, 10),
            PlanStep::Tool {
                name: "scraper".into(),
                cost: ToolCostModel::PerSecond {
                    rate: 0.01,
                    estimated_seconds: 5.0,
                },
            },
        ]);
        let json = serde_json::to_string(&p).unwrap();
        let back: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn step_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&StepKind::Extraction).unwrap(),
            "\"extraction\""
        );
    }

    // -- budgets ----------------------------------------------------------

    fn global_budget(limit: f64, used: f64) -> Budget {
        Budget {
            tenant_id: "t1".into(),
            scope: BudgetScope::Global,
            limit_dollars: limit,
            current_usage: used,
            period: BudgetPeriod::Monthly,
        }
    }

    #[test]
    fn estimate_within_budget_is_ok() {
        let tracker = BudgetTracker::new();
        tracker.set_budget(global_budget(10.0, 2.0));
        assert_eq!(tracker.check_estimate("t1", "wf-1", 3.0), BudgetCheck::Ok);
        assert!(!tracker.would_exceed("t1", "wf-1", 3.0));
    }

    #[test]
    fn overage_is_reported_with_amount() {
        let tracker = BudgetTracker::new();
        tracker.set_budget(global_budget(10.0, 8.0));
        match tracker.check_estimate("t1", "wf-1", 5.0) {
            BudgetCheck::Warning { scope, overage } => {
                assert_eq!(scope, BudgetScope::Global);
                assert!((overage - 3.0).abs() < 1e-9);
            }
            BudgetCheck::Ok => panic!("expected warning"),
        }
        assert!(tracker.would_exceed("t1", "wf-1", 5.0));
    }

    #[test]
    fn workflow_budget_is_consulted() {
        let tracker = BudgetTracker::new();
        tracker.set_budget(Budget {
            tenant_id: "t1".into(),
            scope: BudgetScope::Workflow("wf-1".into()),
            limit_dollars: 1.0,
            current_usage: 0.9,
            period: BudgetPeriod::Daily,
        });
        assert!(tracker.would_exceed("t1", "wf-1", 0.5));
        assert!(!tracker.would_exceed("t1", "wf-2", 0.5));
    }

    #[test]
    fn accumulation_is_cumulative() {
        let tracker = BudgetTracker::new();
        tracker.set_budget(global_budget(10.0, 0.0));
        tracker.accumulate("t1", &BudgetScope::Global, 2.5);
        tracker.accumulate("t1", &BudgetScope::Global, 1.5);
        let budget = tracker.get("t1", &BudgetScope::Global).unwrap();
        assert!((budget.current_usage - 4.0).abs() < 1e-9);
    }

    #[test]
    fn budgets_are_tenant_isolated() {
        let tracker = BudgetTracker::new();
        tracker.set_budget(global_budget(1.0, 0.9));
        assert!(!tracker.would_exceed("t2", "wf-1", 100.0));
    }

    #[test]
    fn concurrent_accumulation_is_atomic() {
        use std::sync::Arc;
        let tracker = Arc::new(BudgetTracker::new());
        tracker.set_budget(global_budget(1000.0, 0.0));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let tracker = tracker.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    tracker.accumulate("t1", &BudgetScope::Global, 1.0);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let budget = tracker.get("t1", &BudgetScope::Global).unwrap();
        assert!((budget.current_usage - 1000.0).abs() < 1e-9);
    }
}
