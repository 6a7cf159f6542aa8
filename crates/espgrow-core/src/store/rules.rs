// ── Rule store ──
//
// The controller keeps schedule times as UTC `HH:MM`. The mirror holds
// them as local wall-clock time: pushed rules are converted on ingest and
// outgoing add/update commands are converted back just before sending.

use std::sync::Arc;

use chrono::Utc;
use espgrow_api::{Channel, Subscription};
use serde_json::Value;

use super::collection::EntityCollection;
use super::{send_command, subscribe_weak};
use crate::command::Command;
use crate::command::requests::{NewRule, RuleUpdate};
use crate::error::CoreError;
use crate::model::{self, AutomationRule, RuleKind};
use crate::schedule::ScheduleZone;
use crate::stream::EntityStream;

#[derive(Clone)]
pub struct RuleStore {
    inner: Arc<RuleStoreInner>,
}

struct RuleStoreInner {
    channel: Channel,
    rules: EntityCollection<AutomationRule>,
    zone: ScheduleZone,
}

impl RuleStore {
    pub fn new(channel: Channel, zone: ScheduleZone) -> Self {
        Self {
            inner: Arc::new(RuleStoreInner {
                channel,
                rules: EntityCollection::new(),
                zone,
            }),
        }
    }

    pub fn attach(&self) -> Vec<Subscription> {
        vec![subscribe_weak(
            &self.inner.channel,
            &self.inner,
            "rules",
            RuleStoreInner::on_rules,
        )]
    }

    /// Zone schedule times are presented in.
    pub fn zone(&self) -> ScheduleZone {
        self.inner.zone
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<AutomationRule>>> {
        self.inner.rules.snapshot()
    }

    pub fn get(&self, rule_id: &str) -> Option<Arc<AutomationRule>> {
        self.inner.rules.get(rule_id)
    }

    /// Rules that act on `device_id`.
    pub fn for_device(&self, device_id: &str) -> Vec<Arc<AutomationRule>> {
        self.snapshot()
            .iter()
            .filter(|r| r.device_id == device_id)
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> EntityStream<AutomationRule> {
        EntityStream::new(self.inner.rules.subscribe())
    }

    pub fn is_synced(&self) -> bool {
        self.inner.rules.version() > 0
    }

    pub async fn wait_synced(&self) {
        let mut rx = self.inner.rules.subscribe_version();
        let _ = rx.wait_for(|v| *v > 0).await;
    }

    pub fn request(&self) -> Result<(), CoreError> {
        send_command(&self.inner.channel, &Command::GetRules)
    }

    /// Create a rule. Schedule times are local `HH:MM`.
    pub fn add(&self, mut rule: NewRule) -> Result<(), CoreError> {
        validate_new_rule(&rule)?;
        let now = Utc::now();
        rule.on_time = self.to_wire(rule.on_time, now)?;
        rule.off_time = self.to_wire(rule.off_time, now)?;
        send_command(&self.inner.channel, &Command::AddRule(rule))
    }

    /// Change a rule. Only the fields set in `update` are sent.
    pub fn update(&self, rule_id: &str, mut update: RuleUpdate) -> Result<(), CoreError> {
        let now = Utc::now();
        update.on_time = self.to_wire(update.on_time, now)?;
        update.off_time = self.to_wire(update.off_time, now)?;
        send_command(
            &self.inner.channel,
            &Command::UpdateRule {
                id: rule_id.to_owned(),
                update,
            },
        )
    }

    pub fn remove(&self, rule_id: &str) -> Result<(), CoreError> {
        send_command(
            &self.inner.channel,
            &Command::RemoveRule {
                id: rule_id.to_owned(),
            },
        )
    }

    /// Flip the enabled flag controller-side. The mirror changes with the
    /// next `rules` push.
    pub fn toggle(&self, rule_id: &str) -> Result<(), CoreError> {
        send_command(
            &self.inner.channel,
            &Command::ToggleRule {
                id: rule_id.to_owned(),
            },
        )
    }

    fn to_wire(
        &self,
        local: Option<String>,
        now: chrono::DateTime<Utc>,
    ) -> Result<Option<String>, CoreError> {
        local
            .map(|t| self.inner.zone.local_to_utc(&t, now))
            .transpose()
    }
}

impl std::fmt::Debug for RuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleStore")
            .field("rules", &self.inner.rules.len())
            .field("zone", &self.inner.zone)
            .finish_non_exhaustive()
    }
}

impl RuleStoreInner {
    fn on_rules(&self, payload: &Value) {
        let Some(mut rules) = model::decode_collection::<AutomationRule>(payload, "rules") else {
            return;
        };

        let now = Utc::now();
        for rule in rules.iter_mut().filter(|r| r.kind == RuleKind::Schedule) {
            for slot in [&mut rule.on_time, &mut rule.off_time] {
                let Some(utc) = slot.as_deref() else { continue };
                match self.zone.utc_to_local(utc, now) {
                    Ok(local) => *slot = Some(local),
                    Err(e) => {
                        tracing::debug!(rule_id = %rule.id, time = utc, error = %e, "keeping unconverted schedule time");
                    }
                }
            }
        }

        tracing::debug!(count = rules.len(), "rules replaced");
        self.rules.replace_all(rules);
    }
}

fn validate_new_rule(rule: &NewRule) -> Result<(), CoreError> {
    let fail = |message: &str| {
        Err(CoreError::ValidationFailed {
            message: message.to_owned(),
        })
    };

    if rule.id.trim().is_empty() || rule.name.trim().is_empty() {
        return fail("rule id and name must not be empty");
    }
    if rule.device_id.trim().is_empty() {
        return fail("rule must target a device");
    }
    match rule.kind {
        RuleKind::Sensor => {
            if rule.sensor_id.is_none() || rule.operator.is_none() {
                return fail("sensor rule needs a sensor and an operator");
            }
            if !rule.threshold.is_some_and(f64::is_finite) {
                return fail("sensor rule needs a finite threshold");
            }
        }
        RuleKind::Schedule => {
            if rule.on_time.is_none() || rule.off_time.is_none() {
                return fail("schedule rule needs on and off times");
            }
        }
    }
    Ok(())
}
