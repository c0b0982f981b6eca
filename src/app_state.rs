//! Implements a struct that holds the state of the REST server.

use time::UtcOffset;

use crate::{mail::Mailer, store::ReimbursementStore};

/// Recipient and sender addresses for the outbound report and reminder mail.
#[derive(Debug, Clone)]
pub struct MailSettings {
    /// The address of the person who owes the money. Balance reports go here.
    pub payer_email: String,

    /// The address of the person waiting to be paid back. CC'd on reports and
    /// the sole recipient of close-check reminders.
    pub paid_email: String,

    /// The fixed sender address.
    pub from_email: String,
}

#[cfg(test)]
impl MailSettings {
    pub(crate) fn test_settings() -> Self {
        Self {
            payer_email: "payer@example.com".to_string(),
            paid_email: "paid@example.com".to_string(),
            from_email: "tracker@example.com".to_string(),
        }
    }
}

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState<R: ReimbursementStore, M: Mailer> {
    /// The store holding reimbursement records.
    pub store: R,

    /// The transport used to deliver report and reminder mail.
    pub mailer: M,

    /// Who the report and reminder mail goes to and comes from.
    pub mail_settings: MailSettings,

    /// The offset from UTC used for wall-clock dates in subject lines and
    /// the job schedule.
    pub utc_offset: UtcOffset,
}
