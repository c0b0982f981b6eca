//! Reimburser is a small web app for tracking expense reimbursement requests
//! and nagging the person who owes you money.
//!
//! Reimbursements move through a three-state lifecycle (uploaded →
//! submitted → closed). A scheduled job emails the payer a running balance of
//! everything outstanding, promoting freshly uploaded records to submitted as
//! it goes, and a second job sends a close-check reminder on the off days.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
mod db;
mod endpoints;
mod mail;
mod reimbursement;
mod report;
mod routing;
mod scheduler;
mod store;

pub use app_state::{AppState, MailSettings};
pub use db::initialize as initialize_db;
pub use mail::{Mailer, Message, MockMailer, SendGridMailer};
pub use reimbursement::{Reimbursement, Status, parse_amount};
pub use report::{SendOutcome, send_balance_report, send_close_check_reminder};
pub use routing::build_router;
pub use scheduler::Scheduler;
pub use store::{ReimbursementStore, SqliteReimbursementStore, create_app_state};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// An amount string did not parse as a number after dollar-sign stripping.
    ///
    /// The client should resubmit with a plain number, optionally prefixed
    /// with a currency symbol.
    #[error("\"{0}\" is not a valid amount")]
    InvalidAmount(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// The mail provider rejected a message or was unreachable, even after
    /// retrying.
    ///
    /// Record promotions that happened before the send are not rolled back,
    /// so the next report run will list those records under "Previously
    /// Submitted".
    #[error("could not deliver mail: {0}")]
    MailDelivery(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Error::SqlError(value)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            Error::SqlError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::MailDelivery(_) => StatusCode::BAD_GATEWAY,
        };

        // SQL error strings can leak schema details, keep those in the logs.
        let message = match &self {
            Error::SqlError(error) => {
                tracing::error!("An unexpected error occurred: {}", error);
                "an internal error occurred".to_string()
            }
            error => error.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
