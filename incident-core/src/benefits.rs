use crate::runtime::{post_and_poll, PollConfig, RunClient, RunOutcome, ToolRegistry};
use serde::{Deserialize, Serialize};

/// Contextual cost figures for benefit calculations. Passed in explicitly so
/// the calculation stays pure and testable; no global tables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BenefitConfig {
    /// EUR per hour.
    pub developer_hourly_rate: f64,
    /// Average time to fix issues manually, in hours.
    pub avg_resolution_time_hours: f64,
    /// EUR per hour.
    pub vm_hourly_cost: f64,
    pub avg_downtime_prevented_minutes: f64,
    /// EUR per minute of webshop revenue.
    pub revenue_per_minute: f64,
    /// Cost of customer dissatisfaction per incident, EUR.
    pub customer_impact_cost: f64,
}

impl Default for BenefitConfig {
    fn default() -> Self {
        Self {
            developer_hourly_rate: 75.0,
            avg_resolution_time_hours: 2.0,
            vm_hourly_cost: 0.50,
            avg_downtime_prevented_minutes: 30.0,
            revenue_per_minute: 100.0,
            customer_impact_cost: 500.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenefitBreakdown {
    pub problem_type: String,
    pub resolution_method: String,
    pub vm_name: String,
    pub developer_time_saved_hours: f64,
    pub developer_cost_saved_eur: f64,
    pub downtime_prevented_minutes: f64,
    pub revenue_preserved_eur: f64,
    pub customer_satisfaction_value_eur: f64,
    pub total_benefit_eur: f64,
}

/// Financial benefit of a prevented issue. An automated reboot saves the
/// full manual-investigation time and the full customer impact; an
/// escalation yields partial savings from quick detection.
pub fn calculate_benefits(
    config: &BenefitConfig,
    problem_type: &str,
    resolution_method: &str,
    vm_name: &str,
    downtime_prevented_minutes: f64,
) -> BenefitBreakdown {
    let rebooted = resolution_method.eq_ignore_ascii_case("reboot");

    let developer_time_saved_hours = if rebooted {
        config.avg_resolution_time_hours
    } else {
        0.5
    };
    let developer_cost_saved_eur = developer_time_saved_hours * config.developer_hourly_rate;

    let revenue_preserved_eur = downtime_prevented_minutes * config.revenue_per_minute;

    let customer_satisfaction_value_eur = if rebooted {
        config.customer_impact_cost
    } else {
        config.customer_impact_cost * 0.5
    };

    let total_benefit_eur =
        developer_cost_saved_eur + revenue_preserved_eur + customer_satisfaction_value_eur;

    BenefitBreakdown {
        problem_type: problem_type.to_string(),
        resolution_method: resolution_method.to_string(),
        vm_name: vm_name.to_string(),
        developer_time_saved_hours,
        developer_cost_saved_eur,
        downtime_prevented_minutes,
        revenue_preserved_eur,
        customer_satisfaction_value_eur,
        total_benefit_eur,
    }
}

pub const CALCULATE_BENEFITS_TOOL: &str = "calculate_benefits";

/// Register the benefit calculation as a run-poller tool. Arguments arrive
/// as the tool-call JSON; the output is the breakdown serialized back to the
/// run.
pub fn register_benefits_tool(registry: &mut ToolRegistry, config: BenefitConfig) {
    registry.register(CALCULATE_BENEFITS_TOOL, move |args| {
        let problem_type = args
            .get("problem_type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");
        let resolution_method = args
            .get("resolution_method")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("escalated");
        let vm_name = args
            .get("vm_name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("");
        let downtime = args
            .get("downtime_prevented_minutes")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(config.avg_downtime_prevented_minutes);

        let breakdown =
            calculate_benefits(&config, problem_type, resolution_method, vm_name, downtime);
        serde_json::to_string(&breakdown).map_err(|e| e.to_string())
    });
}

/// Ask the benefits agent to analyze a prevented issue, driving its run with
/// the calculation tool registered.
pub fn analyze_prevented_issue(
    client: &dyn RunClient,
    thread_id: &str,
    agent_id: &str,
    config: BenefitConfig,
    problem_type: &str,
    resolution_method: &str,
    vm_name: &str,
) -> RunOutcome {
    let mut tools = ToolRegistry::new();
    register_benefits_tool(&mut tools, config);

    let content = format!(
        "Calculate the financial benefits of a prevented issue.\n\
         Problem Type: {problem_type}\n\
         Resolution Method: {resolution_method}\n\
         VM Name: {vm_name}\n\
         Provide direct cost savings, indirect benefits, and the total \
         financial impact with a clear explanation."
    );
    post_and_poll(
        client,
        thread_id,
        agent_id,
        &content,
        &tools,
        &PollConfig::default(),
    )
}
