//! Implements InputPort. Inquire-based interactive menu.
//!
//! Create, start, watch, stop workouts; manage friends; browse and export history.

use crate::adapters::friends::StoreFriendDirectory;
use crate::adapters::ui::banner::{CYBER_GREEN, NEON_PURPLE};
use crate::adapters::ui::progress::MetricsSpinner;
use crate::domain::{
    DomainError, FanoutStatus, Friend, ParticipantId, SessionState, WorkoutPlan, WorkoutSession,
    parse_start_time,
};
use crate::ports::{Clock, FriendDirectory, InputPort};
use crate::usecases::{
    CreateOutcome, HistoryPeriod, HistoryService, SessionManager, StartOutcome, TrackingStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use inquire::error::InquireError;
use inquire::ui::{Color, RenderConfig, Styled};
use inquire::{Confirm, CustomType, MultiSelect, Select, Text};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

const MENU_CREATE: &str = "Create workout";
const MENU_START: &str = "Start workout";
const MENU_WATCH: &str = "Watch live metrics";
const MENU_STOP: &str = "Stop workout";
const MENU_FRIEND: &str = "Add friend";
const MENU_HISTORY: &str = "History";
const MENU_EXPORT: &str = "Export history (CSV)";
const MENU_EXIT: &str = "Exit";

const WATCH_REFRESH: std::time::Duration = std::time::Duration::from_millis(500);

fn rgb(c: (u8, u8, u8)) -> Color {
    Color::Rgb {
        r: c.0,
        g: c.1,
        b: c.2,
    }
}

/// Neon theme for every inquire prompt.
pub fn apply_theme() {
    let config = RenderConfig::default_colored()
        .with_prompt_prefix(Styled::new("»").with_fg(rgb(NEON_PURPLE)))
        .with_highlighted_option_prefix(Styled::new("➤").with_fg(rgb(CYBER_GREEN)))
        .with_answered_prompt_prefix(Styled::new("✓").with_fg(rgb(CYBER_GREEN)));
    inquire::set_global_render_config(config);
}

fn ui_err(e: InquireError) -> DomainError {
    DomainError::Ui(e.to_string())
}

/// Esc / Ctrl-C on a prompt aborts the current action, not the app.
fn cancelled(e: &InquireError) -> bool {
    matches!(
        e,
        InquireError::OperationCanceled | InquireError::OperationInterrupted
    )
}

/// `+N` means N minutes from now; anything else must be RFC 3339.
fn parse_start_input(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, DomainError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(now);
    }
    if let Some(offset) = raw.strip_prefix('+') {
        let minutes: i64 = offset
            .trim()
            .parse()
            .map_err(|_| DomainError::Validation(format!("bad minute offset: {}", raw)))?;
        return Duration::try_minutes(minutes)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| DomainError::Validation(format!("minute offset out of range: {}", raw)));
    }
    parse_start_time(raw)
}

fn session_label(s: &WorkoutSession) -> String {
    format!(
        "{} [{}] {} ({})",
        s.plan.name,
        s.state,
        s.plan.start_time.format("%Y-%m-%d %H:%M UTC"),
        s.id
    )
}

/// TUI adapter. Inquire prompts.
pub struct TuiInputPort {
    manager: Arc<SessionManager>,
    friends: Arc<StoreFriendDirectory>,
    history: Arc<HistoryService>,
    clock: Arc<dyn Clock>,
    export_dir: PathBuf,
}

impl TuiInputPort {
    pub fn new(
        manager: Arc<SessionManager>,
        friends: Arc<StoreFriendDirectory>,
        history: Arc<HistoryService>,
        clock: Arc<dyn Clock>,
        export_dir: PathBuf,
    ) -> Self {
        Self {
            manager,
            friends,
            history,
            clock,
            export_dir,
        }
    }

    fn owner(&self) -> &ParticipantId {
        self.manager.owner_id()
    }

    async fn create_workout(&self) -> Result<(), DomainError> {
        let name = Text::new("Workout name:").prompt().map_err(ui_err)?;
        let description = Text::new("Description:").prompt().map_err(ui_err)?;
        let duration_minutes = CustomType::<i64>::new("Duration (minutes):")
            .with_default(30)
            .with_error_message("Enter a whole number of minutes")
            .prompt()
            .map_err(ui_err)?;
        let start_raw = Text::new("Start time (RFC 3339, +minutes, empty = now):")
            .with_default("+45")
            .prompt()
            .map_err(ui_err)?;
        let start_time = parse_start_input(&start_raw, self.clock.now())?;

        let friends = self.friends.list_participants(self.owner()).await?;
        let participant_ids = if friends.is_empty() {
            Default::default()
        } else {
            let options: Vec<String> = friends
                .iter()
                .map(|f| format!("{} ({})", f.name, f.id))
                .collect();
            let picked = MultiSelect::new("Invite friends:", options)
                .prompt()
                .map_err(ui_err)?;
            friends
                .iter()
                .filter(|f| picked.contains(&format!("{} ({})", f.name, f.id)))
                .map(|f| f.id.clone())
                .collect()
        };
        let tracking_enabled = Confirm::new("Track steps?")
            .with_default(true)
            .prompt()
            .map_err(ui_err)?;

        let outcome = self
            .manager
            .create(WorkoutPlan {
                name,
                description,
                duration_minutes,
                start_time,
                participant_ids,
                tracking_enabled,
            })
            .await?;
        print_created(&outcome);
        Ok(())
    }

    async fn pick_session(
        &self,
        prompt: &str,
        keep: impl Fn(&WorkoutSession) -> bool,
    ) -> Result<Option<WorkoutSession>, DomainError> {
        let sessions: Vec<WorkoutSession> = self
            .manager
            .sessions()
            .await
            .into_iter()
            .filter(|s| keep(s))
            .collect();
        if sessions.is_empty() {
            println!("No matching workouts.");
            return Ok(None);
        }
        let labels: Vec<String> = sessions.iter().map(session_label).collect();
        let picked = Select::new(prompt, labels.clone()).prompt().map_err(ui_err)?;
        Ok(labels
            .iter()
            .position(|l| *l == picked)
            .and_then(|i| sessions.into_iter().nth(i)))
    }

    async fn start_workout(&self) -> Result<(), DomainError> {
        let Some(session) = self
            .pick_session("Start which workout?", |s| s.state == SessionState::Ready)
            .await?
        else {
            return Ok(());
        };
        match self.manager.start(session.id).await? {
            StartOutcome::Scheduled { at } => println!(
                "{} starts automatically at {}.",
                session.plan.name,
                at.format("%Y-%m-%d %H:%M UTC")
            ),
            StartOutcome::Active { tracking } => {
                println!("{} is live.", session.plan.name);
                if tracking == TrackingStatus::Unavailable {
                    println!("Step counter unavailable; continuing without step tracking.");
                }
            }
        }
        Ok(())
    }

    /// Refreshes the live line until Ctrl-C. Offers to stop afterwards.
    async fn watch_workout(&self) -> Result<(), DomainError> {
        let Some(session) = self
            .pick_session("Watch which workout?", |s| s.state == SessionState::Active)
            .await?
        else {
            return Ok(());
        };
        println!("Ctrl-C to leave the live view.");
        let spinner = MetricsSpinner::new(&session.plan.name);
        let mut refresh = tokio::time::interval(WATCH_REFRESH);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                _ = &mut ctrl_c => break,
                _ = refresh.tick() => match self.manager.snapshot(session.id).await {
                    Ok(view) if view.session.state == SessionState::Active => spinner.update(&view.metrics),
                    // Completed elsewhere (planned end reached).
                    _ => break,
                },
            }
        }
        spinner.detach();

        if Confirm::new("Stop this workout now?")
            .with_default(false)
            .prompt()
            .map_err(ui_err)?
        {
            self.stop_session(&session).await?;
        }
        Ok(())
    }

    async fn stop_workout(&self) -> Result<(), DomainError> {
        let Some(session) = self
            .pick_session("Stop which workout?", |s| s.state != SessionState::Completed)
            .await?
        else {
            return Ok(());
        };
        self.stop_session(&session).await
    }

    async fn stop_session(&self, session: &WorkoutSession) -> Result<(), DomainError> {
        let spinner = MetricsSpinner::new(&session.plan.name);
        let summary = self.manager.stop(session.id).await?;
        spinner.finish(&summary);
        Ok(())
    }

    async fn add_friend(&self) -> Result<(), DomainError> {
        let id = Text::new("Friend id:").prompt().map_err(ui_err)?;
        let name = Text::new("Display name:").prompt().map_err(ui_err)?;
        if id.trim().is_empty() || name.trim().is_empty() {
            return Err(DomainError::Validation("friend id and name are required".into()));
        }
        let friend = Friend {
            id: ParticipantId::new(id.trim()),
            name: name.trim().to_string(),
        };
        self.friends.add_friend(self.owner(), &friend).await?;
        println!("Added {}.", friend.name);
        Ok(())
    }

    fn pick_period(&self) -> Result<HistoryPeriod, DomainError> {
        Select::new("Period:", HistoryPeriod::ALL.to_vec())
            .prompt()
            .map_err(ui_err)
    }

    async fn show_history(&self) -> Result<(), DomainError> {
        let period = self.pick_period()?;
        let summaries = self.history.summaries(self.owner(), period).await?;
        if summaries.is_empty() {
            println!("No completed workouts in this period.");
            return Ok(());
        }
        for s in &summaries {
            println!(
                "{}  {:<20} {:>7} steps {:>6.2} km {:>5.0} kcal {:>4} min",
                s.start_time.format("%Y-%m-%d %H:%M"),
                s.name,
                s.steps,
                s.distance_km,
                s.calories_burned,
                s.elapsed_minutes
            );
        }
        let totals = self.history.totals(self.owner(), period).await?;
        println!(
            "{} workouts, {} steps, {:.2} km, {:.0} kcal, {} min",
            totals.workouts,
            totals.steps,
            totals.distance_km,
            totals.calories_burned,
            totals.elapsed_minutes
        );
        Ok(())
    }

    async fn export_history(&self) -> Result<(), DomainError> {
        let period = self.pick_period()?;
        let csv = self.history.export_csv(self.owner(), period).await?;
        tokio::fs::create_dir_all(&self.export_dir)
            .await
            .map_err(|e| DomainError::Write(e.to_string()))?;
        let path = self.export_dir.join(format!(
            "workouts-{}.csv",
            self.clock.now().format("%Y%m%d-%H%M%S")
        ));
        tokio::fs::write(&path, csv)
            .await
            .map_err(|e| DomainError::Write(e.to_string()))?;
        println!("Exported to {}", path.display());
        Ok(())
    }
}

fn print_created(outcome: &CreateOutcome) {
    let s = &outcome.session;
    println!(
        "Created {} for {}.",
        s.plan.name,
        s.plan.start_time.format("%Y-%m-%d %H:%M UTC")
    );
    match &outcome.reminders {
        Ok(report) => println!(
            "Reminders: {} armed, {} already past.",
            report.count(crate::domain::JobStatus::Pending),
            report.count(crate::domain::JobStatus::Skipped)
        ),
        Err(e) => println!("Reminders not armed: {}", e),
    }
    if let Err(e) = &outcome.owner_record {
        println!("Your copy was not saved: {}", e);
    }
    for r in &outcome.fanout.records {
        if r.status == FanoutStatus::Failed {
            println!(
                "Could not share with {}: {}",
                r.recipient_id,
                r.last_error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

#[async_trait]
impl InputPort for TuiInputPort {
    async fn run(&self) -> Result<(), DomainError> {
        let menu = vec![
            MENU_CREATE,
            MENU_START,
            MENU_WATCH,
            MENU_STOP,
            MENU_FRIEND,
            MENU_HISTORY,
            MENU_EXPORT,
            MENU_EXIT,
        ];
        loop {
            let choice = match Select::new("Main menu", menu.clone()).prompt() {
                Ok(c) => c,
                Err(e) if cancelled(&e) => return Ok(()),
                Err(e) => return Err(ui_err(e)),
            };
            let result = match choice {
                MENU_CREATE => self.create_workout().await,
                MENU_START => self.start_workout().await,
                MENU_WATCH => self.watch_workout().await,
                MENU_STOP => self.stop_workout().await,
                MENU_FRIEND => self.add_friend().await,
                MENU_HISTORY => self.show_history().await,
                MENU_EXPORT => self.export_history().await,
                _ => return Ok(()),
            };
            match result {
                Ok(()) => {}
                Err(DomainError::Ui(msg)) => warn!(error = %msg, "prompt aborted"),
                Err(e) => println!("✗ {}", e),
            }
        }
    }
}
