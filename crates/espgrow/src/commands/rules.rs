//! Automation rule command handlers.

use tabled::Tabled;

use espgrow_core::{
    AutomationRule, ComparisonOperator, Controller, EntityStream, NewRule, RuleAction,
};

use crate::cli::{ActionArg, OperatorArg, RulesArgs, RulesCommand};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Trigger")]
    trigger: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Action")]
    action: String,
}

fn row(r: &AutomationRule, color: bool) -> RuleRow {
    RuleRow {
        id: r.id.clone(),
        name: r.name.clone(),
        enabled: output::enabled_label(r.enabled, color),
        kind: r.kind.to_string(),
        trigger: r.trigger_summary(),
        device: r.device_id.clone(),
        action: r.action.to_string(),
    }
}

impl From<OperatorArg> for ComparisonOperator {
    fn from(arg: OperatorArg) -> Self {
        match arg {
            OperatorArg::GreaterThan => Self::GreaterThan,
            OperatorArg::GreaterOrEqual => Self::GreaterOrEqual,
            OperatorArg::LessThan => Self::LessThan,
            OperatorArg::LessOrEqual => Self::LessOrEqual,
            OperatorArg::Equal => Self::Equal,
        }
    }
}

impl From<ActionArg> for RuleAction {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::On => Self::TurnOn,
            ActionArg::Off => Self::TurnOff,
        }
    }
}

pub async fn handle(
    controller: &Controller,
    args: RulesArgs,
    session: &Session,
) -> Result<(), CliError> {
    util::connect(controller, session).await?;
    let store = controller.rules();
    util::synced(session.timeout, "rule list", store.wait_synced()).await?;
    let mut rules = store.subscribe();

    match args.command {
        RulesCommand::List => {
            let snapshot: Vec<AutomationRule> =
                store.snapshot().iter().map(|r| AutomationRule::clone(r)).collect();
            let out = output::render_list(
                session.output,
                &snapshot,
                |r| row(r, session.color),
                |r| r.id.clone(),
            )?;
            output::print_output(&out, session.quiet);
            Ok(())
        }

        RulesCommand::Toggle { rule } => {
            let before = store
                .get(&rule)
                .ok_or_else(|| CliError::not_found("rule", &rule))?;
            store.toggle(&rule)?;
            util::wait_collection(&mut rules, session.timeout, "rule update", |snap| {
                snap.iter().any(|r| r.id == rule && r.enabled != before.enabled)
            })
            .await?;
            let state = if before.enabled { "disabled" } else { "enabled" };
            output::notice(&format!("Rule {rule} {state}"), session.quiet);
            Ok(())
        }

        RulesCommand::Remove { rule } => {
            if store.get(&rule).is_none() {
                return Err(CliError::not_found("rule", &rule));
            }
            if !util::confirm(&format!("Remove rule {rule}?"), session)? {
                return Ok(());
            }
            store.remove(&rule)?;
            util::wait_collection(&mut rules, session.timeout, "rule removal", |snap| {
                snap.iter().all(|r| r.id != rule)
            })
            .await?;
            output::notice(&format!("Rule {rule} removed"), session.quiet);
            Ok(())
        }

        RulesCommand::AddSensor {
            id,
            name,
            sensor,
            operator,
            threshold,
            threshold_off,
            min_run_ms,
            device,
            action,
        } => {
            let mut new = NewRule::sensor(
                id.clone(),
                name,
                sensor,
                operator.into(),
                threshold,
                device,
                action.into(),
            );
            if let Some(off) = threshold_off {
                new.threshold_off = Some(off);
                new.use_hysteresis = Some(true);
            }
            new.min_run_time_ms = min_run_ms;
            add(controller, &mut rules, new, &id, session).await
        }

        RulesCommand::AddSchedule {
            id,
            name,
            on,
            off,
            device,
        } => {
            let new = NewRule::schedule(id.clone(), name, on, off, device);
            add(controller, &mut rules, new, &id, session).await
        }
    }
}

async fn add(
    controller: &Controller,
    rules: &mut EntityStream<AutomationRule>,
    rule: NewRule,
    id: &str,
    session: &Session,
) -> Result<(), CliError> {
    if controller.devices().get(&rule.device_id).is_none() && controller.devices().is_synced() {
        tracing::warn!(device = %rule.device_id, "rule targets an unknown device");
    }
    controller.rules().add(rule)?;
    util::wait_collection(rules, session.timeout, "rule to appear", |snap| {
        snap.iter().any(|r| r.id == id)
    })
    .await?;
    output::notice(&format!("Rule {id} added"), session.quiet);
    Ok(())
}
