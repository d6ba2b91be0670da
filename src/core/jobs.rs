//! Scheduled jobs - Reminders, monthly activity reports and history exports.
//!
//! A scheduler task enqueues periodic jobs on a bounded channel; a worker task
//! drains the channel and runs each job against the database, handing the
//! results to a [`Notifier`]. On-demand jobs (such as a user asking for their
//! history) go through the same queue via [`JobQueue::submit`].
//!
//! Daily reminders and monthly reports record their last run in the
//! `system_state` table, so ticking more often than once a day or a month, or
//! restarting the process, never sends them twice.

use crate::{
    core::{
        billing,
        reservation::{self, ReservationDetail},
        user as users,
    },
    entities::{ReservationStatus, SystemState, User, system_state, user},
    errors::{Error, Result},
};
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

const LAST_DAILY_REMINDER_KEY: &str = "last_daily_reminder";
const LAST_MONTHLY_REPORT_KEY: &str = "last_monthly_report";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Default capacity of the job channel.
pub const JOB_QUEUE_CAPACITY: usize = 64;

/// Work item executed by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Remind users who have not booked today
    DailyReminder,
    /// Send last month's activity report to every user who parked
    MonthlyReport,
    /// Send a user their full reservation history
    ExportHistory {
        /// User requesting the export
        user_id: i64,
    },
}

/// Sending half of the job channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
}

/// Creates a job queue and the receiver to hand to [`run_worker`].
#[must_use]
pub fn channel(capacity: usize) -> (JobQueue, mpsc::Receiver<Job>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (JobQueue { sender }, receiver)
}

impl JobQueue {
    /// Enqueues a job, waiting while the queue is full.
    ///
    /// # Errors
    /// Returns `JobQueueClosed` once the worker has stopped.
    pub async fn submit(&self, job: Job) -> Result<()> {
        self.sender
            .send(job)
            .await
            .map_err(|_| Error::JobQueueClosed)
    }
}

/// One user's parking activity over a calendar month.
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyActivity {
    /// The user
    pub user: user::Model,
    /// First day of the reported month
    pub month: NaiveDate,
    /// Reservations created during the month
    pub bookings: u64,
    /// Hours parked over the completed ones, two decimals
    pub total_hours: f64,
    /// Amount paid over the completed ones, two decimals
    pub total_spent: f64,
    /// Lot booked most often; ties go to the alphabetically first name
    pub most_used_lot: Option<String>,
    /// Every reservation of the month, newest first
    pub details: Vec<ReservationDetail>,
}

/// Delivery channel for job results (email, SMS, chat, ...).
pub trait Notifier: Send + Sync {
    /// Reminds a user who has not booked today.
    fn send_reminder(&self, user: &user::Model) -> Result<()>;

    /// Delivers a user's monthly activity report.
    fn send_monthly_report(&self, activity: &MonthlyActivity) -> Result<()>;

    /// Delivers a user's reservation history.
    fn send_history_export(&self, user: &user::Model, rows: &[ReservationDetail]) -> Result<()>;
}

/// Notifier that only writes tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_reminder(&self, user: &user::Model) -> Result<()> {
        info!(
            "Reminder for {} <{}>: no parking booked today",
            user.username, user.email
        );
        Ok(())
    }

    fn send_monthly_report(&self, activity: &MonthlyActivity) -> Result<()> {
        info!(
            "Monthly report for {} ({}): {} bookings, {:.2} h, ${:.2}, most used: {}",
            activity.user.username,
            activity.month.format("%B %Y"),
            activity.bookings,
            activity.total_hours,
            activity.total_spent,
            activity.most_used_lot.as_deref().unwrap_or("-")
        );
        Ok(())
    }

    fn send_history_export(&self, user: &user::Model, rows: &[ReservationDetail]) -> Result<()> {
        info!(
            "History export for {} <{}>: {} reservations",
            user.username,
            user.email,
            rows.len()
        );
        Ok(())
    }
}

/// Enqueues the periodic jobs on every tick until the queue closes.
///
/// The first tick fires immediately.
pub async fn run_scheduler(queue: JobQueue, period: Duration) {
    let mut interval = tokio::time::interval(period);
    info!("Job scheduler started, ticking every {:?}", period);

    loop {
        interval.tick().await;
        for job in [Job::DailyReminder, Job::MonthlyReport] {
            if queue.submit(job).await.is_err() {
                info!("Job queue closed, stopping scheduler");
                return;
            }
        }
    }
}

/// Runs jobs until every [`JobQueue`] is dropped.
///
/// A failing job is logged and does not stop the worker.
pub async fn run_worker<N>(db: DatabaseConnection, mut receiver: mpsc::Receiver<Job>, notifier: N)
where
    N: Notifier,
{
    info!("Job worker started");
    while let Some(job) = receiver.recv().await {
        match execute_job(&db, &notifier, job, Utc::now()).await {
            Ok(sent) => debug!("{:?} finished, {} notifications sent", job, sent),
            Err(e) => error!("{:?} failed: {}", job, e),
        }
    }
    info!("Job queue drained, worker stopped");
}

/// Runs a single job and returns how many notifications it sent.
#[instrument(skip(db, notifier))]
pub async fn execute_job<N>(
    db: &DatabaseConnection,
    notifier: &N,
    job: Job,
    now: DateTime<Utc>,
) -> Result<usize>
where
    N: Notifier,
{
    match job {
        Job::DailyReminder => Ok(process_daily_reminders(db, notifier, now.date_naive())
            .await?
            .unwrap_or(0)),
        Job::MonthlyReport => Ok(process_monthly_reports(db, notifier, now.date_naive())
            .await?
            .unwrap_or(0)),
        Job::ExportHistory { user_id } => {
            let user = users::require_user(db, user_id).await?;
            let rows = history_export(db, user_id, now).await?;
            notifier.send_history_export(&user, &rows)?;
            Ok(1)
        }
    }
}

/// Active regular users who have not created a reservation on `today` (UTC).
pub async fn users_needing_reminder(
    db: &DatabaseConnection,
    today: NaiveDate,
) -> Result<Vec<user::Model>> {
    let candidates = User::find()
        .filter(user::Column::IsAdmin.eq(false))
        .filter(user::Column::IsActive.eq(true))
        .order_by_asc(user::Column::Id)
        .all(db)
        .await?;

    let mut result = Vec::new();
    for user in candidates {
        let newest = reservation::history(user.id, None).recent(db, 1).await?;
        let booked_today = newest
            .first()
            .is_some_and(|r| r.created_at.date_naive() == today);
        if !booked_today {
            result.push(user);
        }
    }

    Ok(result)
}

/// Per-user activity for the calendar month starting at `month_start`.
///
/// Users without any reservation created that month are left out.
pub async fn monthly_activity(
    db: &DatabaseConnection,
    month_start: NaiveDate,
) -> Result<Vec<MonthlyActivity>> {
    let month_start = month_start.with_day(1).unwrap_or(month_start);
    let month_end = month_start
        .checked_add_months(Months::new(1))
        .ok_or_else(|| Error::InvalidInput {
            message: format!("Month after {month_start} is out of range"),
        })?;
    let window_end = month_end
        .and_hms_opt(0, 0, 0)
        .map_or_else(Utc::now, |end| end.and_utc());

    let users = User::find()
        .filter(user::Column::IsAdmin.eq(false))
        .filter(user::Column::IsActive.eq(true))
        .order_by_asc(user::Column::Id)
        .all(db)
        .await?;

    let mut report = Vec::new();
    for user in users {
        let in_month: Vec<_> = reservation::history(user.id, None)
            .all(db)
            .await?
            .into_iter()
            .filter(|r| {
                let created = r.created_at.date_naive();
                created >= month_start && created < month_end
            })
            .collect();
        if in_month.is_empty() {
            continue;
        }

        let details = reservation::describe(db, in_month, window_end).await?;
        let completed = details
            .iter()
            .filter(|d| d.reservation.status == ReservationStatus::Completed);
        let (hours, spent) = completed.fold((0.0, 0.0), |(hours, spent), d| {
            (hours + d.duration_hours, spent + d.cost)
        });

        report.push(MonthlyActivity {
            bookings: details.len() as u64,
            total_hours: billing::round_hours(hours),
            total_spent: billing::round_cents(spent),
            most_used_lot: most_used_lot(&details),
            month: month_start,
            details,
            user,
        });
    }

    Ok(report)
}

fn most_used_lot(details: &[ReservationDetail]) -> Option<String> {
    let mut visits: BTreeMap<&str, u64> = BTreeMap::new();
    for detail in details {
        *visits.entry(detail.lot_name.as_str()).or_default() += 1;
    }

    let mut best: Option<(&str, u64)> = None;
    for (name, count) in visits {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((name, count));
        }
    }
    best.map(|(name, _)| name.to_string())
}

/// Every reservation of a user, newest first, ready for export.
pub async fn history_export(
    db: &DatabaseConnection,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<ReservationDetail>> {
    let all = reservation::history(user_id, None).all(db).await?;
    reservation::describe(db, all, now).await
}

/// Sends the daily reminders unless they already went out on `today`.
///
/// Returns `None` when the run was skipped.
pub async fn process_daily_reminders<N>(
    db: &DatabaseConnection,
    notifier: &N,
    today: NaiveDate,
) -> Result<Option<usize>>
where
    N: Notifier,
{
    if get_last_run(db, LAST_DAILY_REMINDER_KEY).await? == Some(today) {
        return Ok(None);
    }

    let mut sent = 0;
    for user in users_needing_reminder(db, today).await? {
        match notifier.send_reminder(&user) {
            Ok(()) => sent += 1,
            Err(e) => warn!("Failed to remind {}: {}", user.username, e),
        }
    }

    set_last_run(db, LAST_DAILY_REMINDER_KEY, today).await?;
    info!("Daily reminders sent: {}", sent);
    Ok(Some(sent))
}

/// Sends last month's reports unless they already went out this month.
///
/// Returns `None` when the run was skipped.
pub async fn process_monthly_reports<N>(
    db: &DatabaseConnection,
    notifier: &N,
    today: NaiveDate,
) -> Result<Option<usize>>
where
    N: Notifier,
{
    if !is_monthly_report_needed(db, today).await? {
        return Ok(None);
    }

    let previous_month = today
        .with_day(1)
        .and_then(|first| first.checked_sub_months(Months::new(1)))
        .ok_or_else(|| Error::InvalidInput {
            message: format!("Month before {today} is out of range"),
        })?;

    let mut sent = 0;
    for activity in monthly_activity(db, previous_month).await? {
        match notifier.send_monthly_report(&activity) {
            Ok(()) => sent += 1,
            Err(e) => warn!(
                "Failed to send monthly report to {}: {}",
                activity.user.username, e
            ),
        }
    }

    set_last_run(db, LAST_MONTHLY_REPORT_KEY, today).await?;
    info!(
        "Monthly reports for {} sent: {}",
        previous_month.format("%B %Y"),
        sent
    );
    Ok(Some(sent))
}

/// Returns true unless the monthly reports already ran in `today`'s month.
pub async fn is_monthly_report_needed(db: &DatabaseConnection, today: NaiveDate) -> Result<bool> {
    let last_run = get_last_run(db, LAST_MONTHLY_REPORT_KEY).await?;

    Ok(last_run.is_none_or(|last| last.year() != today.year() || last.month() != today.month()))
}

async fn get_last_run<C>(db: &C, key: &str) -> Result<Option<NaiveDate>>
where
    C: ConnectionTrait,
{
    let state = SystemState::find()
        .filter(system_state::Column::Key.eq(key))
        .one(db)
        .await?;

    match state {
        Some(s) => NaiveDate::parse_from_str(&s.value, DATE_FORMAT)
            .map(Some)
            .map_err(|e| Error::Config {
                message: format!("Failed to parse {key} date: {e}"),
            }),
        None => Ok(None),
    }
}

async fn set_last_run<C>(db: &C, key: &str, date: NaiveDate) -> Result<()>
where
    C: ConnectionTrait,
{
    let value = date.format(DATE_FORMAT).to_string();
    let now = Utc::now().naive_utc();

    let existing = SystemState::find()
        .filter(system_state::Column::Key.eq(key))
        .one(db)
        .await?;

    if let Some(state) = existing {
        let mut active_model: system_state::ActiveModel = state.into();
        active_model.value = Set(value);
        active_model.updated_at = Set(now);
        active_model.update(db).await?;
    } else {
        system_state::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }

    Ok(())
}
