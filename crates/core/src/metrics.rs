//! Agent dashboard metrics.
//!
//! Computed over tickets created in the last two weeks: the current window
//! is the last 7 days and the previous window is the 7 days before that.

use std::collections::HashSet;

use chrono::Duration;
use serde::Serialize;

use crate::template::{ASSIGNED_TO, PRIORITY, STATUS, STATUS_NEW, STATUS_RESOLVED};
use crate::ticket::{find_by_name, FieldSnapshot};
use crate::types::{DbId, Timestamp};
use crate::update::FieldDelta;

/// Length of one metrics window in days.
pub const WINDOW_DAYS: i64 = 7;

/// Number of recent tickets listed on the dashboard.
pub const RECENT_TICKETS: usize = 5;

/// Start of the data needed for [`compute_agent_metrics`].
pub fn lookback_start(now: Timestamp) -> Timestamp {
    now - Duration::days(2 * WINDOW_DAYS)
}

/// A ticket with its audit activity, as needed for metrics.
#[derive(Debug, Clone)]
pub struct TicketActivity {
    pub id: DbId,
    pub title: String,
    pub created_by: DbId,
    pub created_at: Timestamp,
    pub fields: Vec<FieldSnapshot>,
    pub updates: Vec<UpdateActivity>,
}

#[derive(Debug, Clone)]
pub struct UpdateActivity {
    pub created_by: DbId,
    pub created_at: Timestamp,
    pub internal: bool,
    pub deltas: Vec<FieldDelta>,
}

impl UpdateActivity {
    fn resolves(&self) -> bool {
        self.deltas
            .iter()
            .any(|d| d.field == STATUS && d.new_value == STATUS_RESOLVED)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentTicket {
    pub id: DbId,
    pub title: String,
    pub status: String,
    pub priority: Option<String>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentMetrics {
    pub assigned_tickets: usize,
    pub new_tickets: usize,
    pub resolved_tickets: usize,
    /// Average hours from creation to resolution, e.g. `"3.5h"`.
    pub avg_resolution_time: String,
    /// Average hours from creation to the first public reply, e.g. `"0.4h"`.
    pub avg_response_time: String,
    /// Percent change of assigned tickets versus the previous window.
    pub assigned_trend: f64,
    pub recent_tickets: Vec<RecentTicket>,
}

/// Compute the dashboard metrics for one agent.
///
/// - assigned: current-window tickets whose "Assigned To" is the agent
/// - new: all current-window tickets
/// - resolved: current-window tickets the agent moved to "Resolved"
/// - response time: first public update not written by the ticket's creator
pub fn compute_agent_metrics(
    agent_id: DbId,
    tickets: &[TicketActivity],
    now: Timestamp,
) -> AgentMetrics {
    let window_start = now - Duration::days(WINDOW_DAYS);
    let previous_start = lookback_start(now);
    let agent = agent_id.to_string();

    let is_assigned = |t: &TicketActivity| {
        find_by_name(&t.fields, ASSIGNED_TO).is_some_and(|f| f.value == agent)
    };

    let current: Vec<&TicketActivity> = tickets
        .iter()
        .filter(|t| t.created_at >= window_start)
        .collect();
    let previous_assigned = tickets
        .iter()
        .filter(|t| t.created_at >= previous_start && t.created_at < window_start)
        .filter(|t| is_assigned(*t))
        .count();

    let mut assigned: Vec<&TicketActivity> =
        current.iter().copied().filter(|t| is_assigned(*t)).collect();

    let resolved_tickets = current
        .iter()
        .filter(|t| {
            t.updates
                .iter()
                .any(|u| u.created_by == agent_id && u.resolves())
        })
        .map(|t| t.id)
        .collect::<HashSet<_>>()
        .len();

    let mut resolution = Vec::new();
    let mut response = Vec::new();
    for ticket in &assigned {
        let mut updates: Vec<&UpdateActivity> = ticket.updates.iter().collect();
        updates.sort_by_key(|u| u.created_at);

        if let Some(u) = updates.iter().find(|u| u.resolves()) {
            resolution.push(u.created_at - ticket.created_at);
        }
        if let Some(u) = updates
            .iter()
            .find(|u| !u.internal && u.created_by != ticket.created_by)
        {
            response.push(u.created_at - ticket.created_at);
        }
    }

    let assigned_tickets = assigned.len();
    let assigned_trend = if previous_assigned > 0 {
        (assigned_tickets as f64 - previous_assigned as f64) / previous_assigned as f64 * 100.0
    } else {
        0.0
    };

    assigned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let recent_tickets = assigned
        .iter()
        .take(RECENT_TICKETS)
        .map(|t| RecentTicket {
            id: t.id,
            title: t.title.clone(),
            status: find_by_name(&t.fields, STATUS)
                .map(|f| f.value.clone())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| STATUS_NEW.to_string()),
            priority: find_by_name(&t.fields, PRIORITY)
                .map(|f| f.value.clone())
                .filter(|v| !v.is_empty()),
            created_at: t.created_at,
        })
        .collect();

    AgentMetrics {
        assigned_tickets,
        new_tickets: current.len(),
        resolved_tickets,
        avg_resolution_time: format_hours(&resolution),
        avg_response_time: format_hours(&response),
        assigned_trend,
        recent_tickets,
    }
}

fn format_hours(durations: &[Duration]) -> String {
    if durations.is_empty() {
        return "0.0h".to_string();
    }
    let total_secs: i64 = durations.iter().map(|d| d.num_seconds()).sum();
    let hours = total_secs as f64 / durations.len() as f64 / 3600.0;
    format!("{hours:.1}h")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::field::FieldType;

    const AGENT: DbId = 7;
    const CUSTOMER: DbId = 100;

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap()
    }

    fn fields(assigned: &str, status: &str) -> Vec<FieldSnapshot> {
        vec![
            FieldSnapshot {
                id: 1,
                name: ASSIGNED_TO.into(),
                field_type: FieldType::Agent,
                value: assigned.into(),
            },
            FieldSnapshot {
                id: 2,
                name: STATUS.into(),
                field_type: FieldType::Select,
                value: status.into(),
            },
        ]
    }

    fn ticket(id: DbId, days_ago: i64, assigned: &str) -> TicketActivity {
        TicketActivity {
            id,
            title: format!("Ticket {id}"),
            created_by: CUSTOMER,
            created_at: now() - Duration::days(days_ago),
            fields: fields(assigned, "New"),
            updates: Vec::new(),
        }
    }

    fn update(by: DbId, at: Timestamp, internal: bool, resolves: bool) -> UpdateActivity {
        UpdateActivity {
            created_by: by,
            created_at: at,
            internal,
            deltas: if resolves {
                vec![FieldDelta {
                    id: 2,
                    field: STATUS.into(),
                    field_type: FieldType::Select,
                    old_value: "New".into(),
                    new_value: STATUS_RESOLVED.into(),
                }]
            } else {
                Vec::new()
            },
        }
    }

    #[test]
    fn empty_input_yields_zeroes() {
        let m = compute_agent_metrics(AGENT, &[], now());
        assert_eq!(m.assigned_tickets, 0);
        assert_eq!(m.avg_resolution_time, "0.0h");
        assert_eq!(m.assigned_trend, 0.0);
        assert!(m.recent_tickets.is_empty());
    }

    #[test]
    fn counts_and_trend_use_both_windows() {
        let tickets = vec![
            ticket(1, 1, "7"),
            ticket(2, 2, "7"),
            ticket(3, 3, "8"),
            ticket(4, 9, "7"),
        ];
        let m = compute_agent_metrics(AGENT, &tickets, now());
        assert_eq!(m.new_tickets, 3);
        assert_eq!(m.assigned_tickets, 2);
        assert_eq!(m.assigned_trend, 100.0);
        assert_eq!(m.recent_tickets[0].id, 1);
    }

    #[test]
    fn resolution_and_response_times_are_averaged_in_hours() {
        let mut t = ticket(1, 1, "7");
        let created = t.created_at;
        t.updates = vec![
            update(CUSTOMER, created + Duration::minutes(10), false, false),
            update(AGENT, created + Duration::hours(1), true, false),
            update(AGENT, created + Duration::hours(2), false, false),
            update(AGENT, created + Duration::hours(3), false, true),
        ];
        let m = compute_agent_metrics(AGENT, &[t], now());
        assert_eq!(m.avg_response_time, "2.0h");
        assert_eq!(m.avg_resolution_time, "3.0h");
        assert_eq!(m.resolved_tickets, 1);
    }

    #[test]
    fn resolved_counts_only_this_agents_resolutions() {
        let mut t = ticket(1, 1, "8");
        t.updates = vec![update(8, t.created_at + Duration::hours(1), false, true)];
        let m = compute_agent_metrics(AGENT, &[t], now());
        assert_eq!(m.resolved_tickets, 0);
    }
}
