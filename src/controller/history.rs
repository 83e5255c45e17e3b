//! Bounded cycle history, performance summary and daily yield.

use std::collections::VecDeque;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::policy::round2;
use crate::agent::PumpAction;
use crate::context::{Context, PerformanceEntry};

/// Records kept in history.
pub const HISTORY_CAPACITY: usize = 10;
/// Resolved records fed back into the context.
pub const PERFORMANCE_WINDOW: usize = 5;

/// One executed decision and, once the next cycle has looked, its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub id: Uuid,
    /// Sequence number of the control cycle that created the record
    pub cycle_seq: u64,
    pub timestamp: DateTime<Utc>,
    pub context_snapshot: Context,
    pub decision: PumpAction,
    pub expected_gain: f64,
    pub pool_temp_at_decision: f64,
    pub heating_duration_minutes: u32,
    pub is_exploratory: bool,
    pub actual_gain: Option<f64>,
}

impl CycleRecord {
    pub fn new(
        cycle_seq: u64,
        timestamp: DateTime<Utc>,
        context: &Context,
        decision: PumpAction,
        expected_gain: f64,
        heating_duration_minutes: u32,
        is_exploratory: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            cycle_seq,
            timestamp,
            context_snapshot: context.snapshot(),
            decision,
            expected_gain,
            pool_temp_at_decision: context.pool_temp,
            heating_duration_minutes,
            is_exploratory,
            actual_gain: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.actual_gain.is_some()
    }

    /// Short condition label used in the performance summary.
    pub fn conditions_label(&self) -> String {
        let ctx = &self.context_snapshot;
        format!(
            "{}, wind={:.0}km/h, uv={:.1}",
            ctx.weather_condition,
            ctx.wind_speed.unwrap_or(0.0),
            ctx.uv_index.unwrap_or(0.0)
        )
    }
}

/// Outcome of resolving a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedCycle {
    pub record_id: Uuid,
    pub decision: PumpAction,
    pub expected_gain: f64,
    pub actual_gain: f64,
    pub heating_duration_minutes: u32,
}

/// FIFO of the most recent [`HISTORY_CAPACITY`] records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryStore {
    records: VecDeque<CycleRecord>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from persisted records, keeping the newest ones.
    pub fn from_records(records: Vec<CycleRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            store.append(record);
        }
        store
    }

    /// Append a record, evicting the oldest beyond capacity.
    pub fn append(&mut self, record: CycleRecord) -> Option<CycleRecord> {
        self.records.push_back(record);
        if self.records.len() > HISTORY_CAPACITY {
            self.records.pop_front()
        } else {
            None
        }
    }

    /// Resolve the newest record if it is unresolved and belongs to an
    /// earlier cycle than `current_cycle`.
    pub fn resolve_prior(&mut self, current_cycle: u64, current_pool_temp: f64) -> Option<ResolvedCycle> {
        let record = self.records.back_mut()?;
        if record.is_resolved() || record.cycle_seq >= current_cycle {
            return None;
        }
        let actual_gain = round2(current_pool_temp - record.pool_temp_at_decision);
        record.actual_gain = Some(actual_gain);
        Some(ResolvedCycle {
            record_id: record.id,
            decision: record.decision,
            expected_gain: record.expected_gain,
            actual_gain,
            heating_duration_minutes: record.heating_duration_minutes,
        })
    }

    /// Summary of the most recent resolved records, oldest first.
    pub fn performance_summary(&self) -> Vec<PerformanceEntry> {
        let resolved: Vec<&CycleRecord> =
            self.records.iter().filter(|r| r.is_resolved()).collect();
        let start = resolved.len().saturating_sub(PERFORMANCE_WINDOW);
        resolved[start..]
            .iter()
            .map(|record| {
                let actual_gain = record.actual_gain.unwrap_or(0.0);
                let efficiency_pct = if record.expected_gain > 0.0 {
                    (actual_gain / record.expected_gain * 100.0).trunc() as i64
                } else {
                    0
                };
                PerformanceEntry {
                    conditions: record.conditions_label(),
                    decision: record.decision,
                    expected_gain: record.expected_gain,
                    actual_gain,
                    efficiency_pct,
                }
            })
            .collect()
    }

    /// Sequence number for the first cycle after a restore.
    pub fn next_cycle_seq(&self) -> u64 {
        self.records.back().map(|r| r.cycle_seq + 1).unwrap_or(1)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CycleRecord> {
        self.records.iter()
    }

    pub fn to_vec(&self) -> Vec<CycleRecord> {
        self.records.iter().cloned().collect()
    }
}

/// Gains accumulated over one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyYield {
    pub date: NaiveDate,
    pub gain_celsius: f64,
    pub heating_minutes: u32,
    pub cycles: u32,
}

impl DailyYield {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            date: now.date_naive(),
            gain_celsius: 0.0,
            heating_minutes: 0,
            cycles: 0,
        }
    }

    /// Start a new day if `now` is past the tracked date.
    pub fn roll_over(&mut self, now: DateTime<Utc>) {
        if now.date_naive() != self.date {
            *self = Self::new(now);
        }
    }

    /// Account a resolved cycle.
    pub fn record(&mut self, now: DateTime<Utc>, resolved: &ResolvedCycle) {
        self.roll_over(now);
        self.gain_celsius = round2(self.gain_celsius + resolved.actual_gain);
        self.heating_minutes += resolved.heating_duration_minutes;
        self.cycles += 1;
    }
}
