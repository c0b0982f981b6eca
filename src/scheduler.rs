//! Weekly scheduling of the balance report and close-check reminder.
//!
//! The report goes out Monday, Wednesday and Friday mornings; the reminder
//! covers the complementary Tuesday, Thursday and Saturday mornings. There
//! are no catch-up semantics: a firing missed while the process is down is
//! simply skipped.

use std::{future::Future, time::Duration};

use time::{OffsetDateTime, Time, Weekday, macros::time};
use tokio::task::JoinHandle;

use crate::{
    AppState,
    mail::Mailer,
    report::{send_balance_report, send_close_check_reminder},
    store::ReimbursementStore,
};

/// The weekdays the balance report is sent on.
const REPORT_DAYS: [Weekday; 3] = [Weekday::Monday, Weekday::Wednesday, Weekday::Friday];

/// The weekdays the close-check reminder is sent on.
const REMINDER_DAYS: [Weekday; 3] = [Weekday::Tuesday, Weekday::Thursday, Weekday::Saturday];

/// The wall-clock time both jobs fire at.
const SEND_TIME: Time = time!(6:00);

/// Runs the report and reminder jobs on their weekly recurrence.
///
/// The scheduler is constructed explicitly and does nothing until
/// [Scheduler::start] is called; [Scheduler::stop] cancels the job loops.
pub struct Scheduler<R: ReimbursementStore, M: Mailer> {
    state: AppState<R, M>,
    handles: Vec<JoinHandle<()>>,
}

impl<R: ReimbursementStore, M: Mailer> Scheduler<R, M> {
    /// Create a scheduler for `state`. No jobs run until [Scheduler::start].
    pub fn new(state: AppState<R, M>) -> Self {
        Self {
            state,
            handles: Vec::new(),
        }
    }

    /// Spawn the report and reminder job loops onto the tokio runtime.
    ///
    /// Calling `start` twice is a no-op.
    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            return;
        }

        let report_state = self.state.clone();
        self.handles.push(tokio::spawn(async move {
            run_job_loop(report_state, &REPORT_DAYS, "balance report", |state, date| async move {
                send_balance_report(&state.store, &state.mailer, &state.mail_settings, date)
                    .await
                    .map(|_| ())
            })
            .await;
        }));

        let reminder_state = self.state.clone();
        self.handles.push(tokio::spawn(async move {
            run_job_loop(
                reminder_state,
                &REMINDER_DAYS,
                "close-check reminder",
                |state, date| async move {
                    send_close_check_reminder(
                        &state.store,
                        &state.mailer,
                        &state.mail_settings,
                        date,
                    )
                    .await
                    .map(|_| ())
                },
            )
            .await;
        }));

        tracing::info!("scheduler started");
    }

    /// Cancel the job loops. Jobs already mid-run are aborted.
    pub fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }

        tracing::info!("scheduler stopped");
    }
}

impl<R: ReimbursementStore, M: Mailer> Drop for Scheduler<R, M> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_job_loop<R, M, F, Fut>(
    state: AppState<R, M>,
    weekdays: &[Weekday],
    job_name: &str,
    job: F,
) where
    R: ReimbursementStore,
    M: Mailer,
    F: Fn(AppState<R, M>, time::Date) -> Fut,
    Fut: Future<Output = Result<(), crate::Error>>,
{
    // The wall clock is read once at startup; after that the loop advances
    // from slot to slot, so a slow job cannot make the same slot fire twice.
    let mut now = OffsetDateTime::now_utc().to_offset(state.utc_offset);

    loop {
        let next = next_occurrence(now, weekdays, SEND_TIME);
        let wait = Duration::try_from(next - now).unwrap_or_default();

        tracing::info!("next {job_name} scheduled for {next}");
        tokio::time::sleep(wait).await;

        if let Err(error) = job(state.clone(), next.date()).await {
            tracing::error!("scheduled {job_name} failed: {error}");
        }

        now = next;
    }
}

/// The first instant strictly after `after` that falls on one of `weekdays`
/// at the wall-clock time `at`, in the same UTC offset as `after`.
fn next_occurrence(after: OffsetDateTime, weekdays: &[Weekday], at: Time) -> OffsetDateTime {
    let mut date = after.date();

    loop {
        if weekdays.contains(&date.weekday()) {
            let candidate = date.with_time(at).assume_offset(after.offset());

            if candidate > after {
                return candidate;
            }
        }

        date = date.next_day().expect("date out of range");
    }
}
