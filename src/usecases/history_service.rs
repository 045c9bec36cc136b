//! Completed-workout history: period filters, totals and CSV export.
//!
//! Reads the summaries `SessionManager::stop` writes to the owner's `history` collection.

use crate::domain::{DomainError, ParticipantId, SessionSummary};
use crate::ports::{Clock, HISTORY_COLLECTION, RecordStore};
use chrono::Duration;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPeriod {
    Week,
    Month,
    All,
}

impl HistoryPeriod {
    pub const ALL: [HistoryPeriod; 3] = [HistoryPeriod::Week, HistoryPeriod::Month, HistoryPeriod::All];

    fn window(self) -> Option<Duration> {
        match self {
            HistoryPeriod::Week => Some(Duration::days(7)),
            HistoryPeriod::Month => Some(Duration::days(30)),
            HistoryPeriod::All => None,
        }
    }
}

impl std::fmt::Display for HistoryPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            HistoryPeriod::Week => "Last 7 days",
            HistoryPeriod::Month => "Last 30 days",
            HistoryPeriod::All => "All time",
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct HistoryTotals {
    pub workouts: usize,
    pub steps: u64,
    pub distance_km: f64,
    pub calories_burned: f64,
    pub elapsed_minutes: i64,
}

pub struct HistoryService {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl HistoryService {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Summaries that started inside `period`, newest first. Unreadable rows are skipped.
    pub async fn summaries(
        &self,
        owner_id: &ParticipantId,
        period: HistoryPeriod,
    ) -> Result<Vec<SessionSummary>, DomainError> {
        let since = period.window().map(|w| self.clock.now() - w);
        let rows = self.store.list(owner_id, HISTORY_COLLECTION).await?;
        let mut summaries: Vec<SessionSummary> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<SessionSummary>(row) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!(owner = %owner_id, error = %e, "skipping unreadable history row");
                    None
                }
            })
            .filter(|s| since.is_none_or(|since| s.start_time >= since))
            .collect();
        summaries.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(summaries)
    }

    pub async fn totals(
        &self,
        owner_id: &ParticipantId,
        period: HistoryPeriod,
    ) -> Result<HistoryTotals, DomainError> {
        let summaries = self.summaries(owner_id, period).await?;
        Ok(summaries.iter().fold(HistoryTotals::default(), |mut t, s| {
            t.workouts += 1;
            t.steps += s.steps;
            t.distance_km += s.distance_km;
            t.calories_burned += s.calories_burned;
            t.elapsed_minutes += s.elapsed_minutes;
            t
        }))
    }

    /// Semicolon-delimited CSV of the summaries in `period`, with a header row.
    pub async fn export_csv(
        &self,
        owner_id: &ParticipantId,
        period: HistoryPeriod,
    ) -> Result<String, DomainError> {
        let summaries = self.summaries(owner_id, period).await?;
        summaries_to_csv(&summaries).map_err(|e| DomainError::Write(format!("csv export: {}", e)))
    }
}

fn summaries_to_csv(summaries: &[SessionSummary]) -> Result<String, csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .from_writer(Vec::new());

    wtr.write_record([
        "Date",
        "Workout",
        "Description",
        "Steps",
        "DistanceKm",
        "Calories",
        "PlannedMinutes",
        "ElapsedMinutes",
    ])?;
    for s in summaries {
        // Newlines in free text would split the row for spreadsheet imports.
        let description = s.description.replace('\n', " ").replace('\r', "");
        wtr.write_record([
            s.start_time.format("%Y-%m-%d %H:%M").to_string(),
            s.name.clone(),
            description,
            s.steps.to_string(),
            format!("{:.2}", s.distance_km),
            format!("{:.1}", s.calories_burned),
            s.duration_minutes.to_string(),
            s.elapsed_minutes.to_string(),
        ])?;
    }

    wtr.flush()?;
    let bytes = wtr
        .into_inner()
        .map_err(|e| csv::Error::from(std::io::Error::other(e.to_string())))?;
    String::from_utf8(bytes).map_err(|e| {
        csv::Error::from(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            e.to_string(),
        ))
    })
}
