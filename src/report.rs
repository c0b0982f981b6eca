//! The balance report and close-check reminder jobs, and the API routes that
//! trigger them manually.
//!
//! The balance report is the heart of the application: it gathers every open
//! reimbursement, promotes freshly uploaded records to submitted, and mails
//! the payer an itemised ledger with a running total.

use std::time::Duration;

use axum::{Json, extract::State};
use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::{
    AppState, Error,
    app_state::MailSettings,
    mail::{Mailer, Message},
    reimbursement::{OPEN_STATUSES, Reimbursement, Status},
    store::ReimbursementStore,
};

/// How many delivery attempts to make before giving up on a message.
const MAIL_ATTEMPTS: u32 = 3;

/// The outcome of a report or reminder run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// A message was delivered.
    Sent,
    /// Nothing is outstanding, so no message was sent.
    NothingOutstanding,
}

/// Send the payer an itemised balance report and promote every uploaded
/// reimbursement to submitted.
///
/// No message is sent when nothing is outstanding. Promotions are applied as
/// an ordered batch before the mail goes out, so a persistence failure aborts
/// the run without a misleading report being delivered. The reverse does not
/// hold: if delivery fails after the promotions, the promotions stay applied
/// and the records appear under "Previously Submitted" in the next run.
///
/// # Errors
/// Returns an [Error::SqlError] if the store cannot be read or a promotion
/// fails, or an [Error::MailDelivery] if the report cannot be delivered.
pub async fn send_balance_report<R, M>(
    store: &R,
    mailer: &M,
    settings: &MailSettings,
    today: Date,
) -> Result<SendOutcome, Error>
where
    R: ReimbursementStore,
    M: Mailer,
{
    let open = store.get_by_status(&OPEN_STATUSES)?;

    if open.is_empty() {
        tracing::info!("no outstanding reimbursements, skipping balance report");
        return Ok(SendOutcome::NothingOutstanding);
    }

    let (new, prior): (Vec<&Reimbursement>, Vec<&Reimbursement>) = open
        .iter()
        .partition(|reimbursement| reimbursement.status == Status::Uploaded);

    for reimbursement in &new {
        store.set_status(
            &reimbursement.name,
            reimbursement.amount,
            &[Status::Uploaded],
            Status::Submitted,
        )?;
    }

    let text = build_report_text(&new, &prior);
    let message = Message {
        to: settings.payer_email.clone(),
        cc: Some(settings.paid_email.clone()),
        from: settings.from_email.clone(),
        subject: format!(
            "Reimbursement Request for {}/{}",
            u8::from(today.month()),
            today.day()
        ),
        html: text.replace('\n', "<br>"),
        text,
    };

    send_with_retry(mailer, &message).await?;

    tracing::info!(
        new = new.len(),
        previously_submitted = prior.len(),
        "sent balance report"
    );

    Ok(SendOutcome::Sent)
}

/// Send a friendly reminder to check whether outstanding reimbursements have
/// been paid, ahead of the next balance report.
///
/// No message is sent when nothing is outstanding, and no records are
/// mutated.
///
/// # Errors
/// Returns an [Error::SqlError] if the store cannot be read, or an
/// [Error::MailDelivery] if the reminder cannot be delivered.
pub async fn send_close_check_reminder<R, M>(
    store: &R,
    mailer: &M,
    settings: &MailSettings,
    today: Date,
) -> Result<SendOutcome, Error>
where
    R: ReimbursementStore,
    M: Mailer,
{
    let open = store.get_by_status(&OPEN_STATUSES)?;

    if open.is_empty() {
        tracing::info!("no outstanding reimbursements, skipping reminder");
        return Ok(SendOutcome::NothingOutstanding);
    }

    let text = "This is a friendly reminder to check whether outstanding reimbursements \
                have been paid before the next request is sent tomorrow."
        .to_string();
    let message = Message {
        to: settings.paid_email.clone(),
        cc: None,
        from: settings.from_email.clone(),
        subject: format!(
            "Reimbursement Close-Check Reminder {}/{}",
            u8::from(today.month()),
            today.day()
        ),
        html: format!("<p>Hi,</p><p>{text}</p>"),
        text,
    };

    send_with_retry(mailer, &message).await?;
    tracing::info!("sent close-check reminder");

    Ok(SendOutcome::Sent)
}

/// Format the plain-text body of a balance report.
fn build_report_text(new: &[&Reimbursement], prior: &[&Reimbursement]) -> String {
    let mut total = 0.0;
    let mut text = String::from(
        "Hello! Here are the reimbursements that I've requested. \
         This email will be sent automatically until the outstanding balance is zero.\n",
    );

    text.push_str("\nNew:\n");
    push_section(&mut text, new, &mut total);

    text.push_str("\nPreviously Submitted:\n");
    push_section(&mut text, prior, &mut total);

    text.push_str("\nTotal Outstanding: ");
    text.push_str(&format_total(total));
    text.push('\n');

    text
}

fn push_section(text: &mut String, reimbursements: &[&Reimbursement], total: &mut f64) {
    if reimbursements.is_empty() {
        text.push_str("None\n");
        return;
    }

    for reimbursement in reimbursements {
        text.push_str(&format!(
            "{} ({}): ${}\n",
            reimbursement.name, reimbursement.receipt, reimbursement.amount
        ));
        *total += reimbursement.amount;
    }
}

/// Format a total to two decimal places, rendering negative totals with the
/// sign ahead of the dollar symbol, e.g. `-$5.25`.
fn format_total(total: f64) -> String {
    if total < 0.0 {
        format!("-${:.2}", total.abs())
    } else {
        format!("${total:.2}")
    }
}

/// Deliver `message`, retrying with a short backoff.
///
/// Delivery is not idempotency-sensitive, the worst case of a retry after an
/// ambiguous failure is a duplicate email.
async fn send_with_retry<M: Mailer>(mailer: &M, message: &Message) -> Result<(), Error> {
    let mut last_error = None;

    for attempt in 1..=MAIL_ATTEMPTS {
        match mailer.send(message).await {
            Ok(()) => return Ok(()),
            Err(error) => {
                tracing::warn!("mail delivery attempt {attempt}/{MAIL_ATTEMPTS} failed: {error}");
                last_error = Some(error);

                if attempt < MAIL_ATTEMPTS {
                    tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::MailDelivery("no delivery attempts made".to_string())))
}

/// The acknowledgement returned by the manual trigger routes.
#[derive(Debug, Serialize)]
pub struct SendAck {
    /// Whether a message was actually delivered.
    pub sent: bool,
}

/// A route handler that runs the balance report synchronously.
pub async fn post_email_endpoint<R, M>(
    State(state): State<AppState<R, M>>,
) -> Result<Json<SendAck>, Error>
where
    R: ReimbursementStore,
    M: Mailer,
{
    let today = OffsetDateTime::now_utc().to_offset(state.utc_offset).date();
    let outcome =
        send_balance_report(&state.store, &state.mailer, &state.mail_settings, today).await?;

    Ok(Json(SendAck {
        sent: outcome == SendOutcome::Sent,
    }))
}

/// A route handler that runs the close-check reminder synchronously.
pub async fn post_reminder_endpoint<R, M>(
    State(state): State<AppState<R, M>>,
) -> Result<Json<SendAck>, Error>
where
    R: ReimbursementStore,
    M: Mailer,
{
    let today = OffsetDateTime::now_utc().to_offset(state.utc_offset).date();
    let outcome =
        send_close_check_reminder(&state.store, &state.mailer, &state.mail_settings, today).await?;

    Ok(Json(SendAck {
        sent: outcome == SendOutcome::Sent,
    }))
}
