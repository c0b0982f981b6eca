//! This file defines the `Reimbursement` type, its status lifecycle and the
//! API routes for creating, closing and listing reimbursements.

use std::{fmt::Display, str::FromStr};

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AppState, Error, endpoints, mail::Mailer, store::ReimbursementStore};

/// The ID of a reimbursement in the database.
pub type ReimbursementId = i64;

/// Where a reimbursement is in its lifecycle.
///
/// Statuses only ever move forward: uploaded → submitted → closed. A record
/// is promoted to submitted the first time it appears in a balance report,
/// and closed once the payer has settled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created but not yet included in any sent report.
    Uploaded,
    /// Included in at least one sent report, awaiting payer action.
    Submitted,
    /// Confirmed paid/resolved, excluded from future reports.
    Closed,
}

/// The statuses that count towards the outstanding balance.
pub const OPEN_STATUSES: [Status; 2] = [Status::Uploaded, Status::Submitted];

impl Status {
    /// The status as the lowercase string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Uploaded => "uploaded",
            Status::Submitted => "submitted",
            Status::Closed => "closed",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(Status::Uploaded),
            "submitted" => Ok(Status::Submitted),
            "closed" => Ok(Status::Closed),
            other => Err(format!("\"{other}\" is not a valid reimbursement status")),
        }
    }
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: String| FromSqlError::Other(error.into()))
    }
}

/// An expense waiting to be paid back, e.g., a taxi fare covered out of
/// pocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reimbursement {
    /// The ID of the reimbursement.
    pub id: ReimbursementId,

    /// The title of the reimbursement. Not unique, several reimbursements can
    /// share a name.
    pub name: String,

    /// Where the reimbursement is in its lifecycle.
    pub status: Status,

    /// The amount owed, stored as a plain number with no currency symbol.
    pub amount: f64,

    /// A link to or description of the receipt for the expense.
    pub receipt: String,
}

/// Create the reimbursement table in the database.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn create_reimbursement_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS reimbursement (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                amount REAL NOT NULL,
                receipt TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

/// Map a database row to a [Reimbursement].
pub(crate) fn map_row(row: &Row) -> Result<Reimbursement, rusqlite::Error> {
    Ok(Reimbursement {
        id: row.get(0)?,
        name: row.get(1)?,
        status: row.get(2)?,
        amount: row.get(3)?,
        receipt: row.get(4)?,
    })
}

/// Parse an amount entered by the client, tolerating a dollar sign.
///
/// Everything up to and including the first `$` is dropped before parsing,
/// so `"$42.50"` and `"NZ$42.50"` both parse as `42.5`.
///
/// # Errors
/// Returns an [Error::InvalidAmount] if the remainder does not parse as a
/// number.
pub fn parse_amount(raw: &str) -> Result<f64, Error> {
    let stripped = match raw.find('$') {
        Some(index) => &raw[index + 1..],
        None => raw,
    };

    stripped
        .trim()
        .parse()
        .map_err(|_| Error::InvalidAmount(raw.to_string()))
}

/// Read a string field out of a JSON request body.
fn string_field(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(String::from)
}

/// A route handler for creating a new reimbursement with the status
/// "uploaded".
///
/// The body is taken as free-form JSON so that requests missing a field can
/// be refused with 418 I'm A Teapot and the body echoed back verbatim,
/// unknown fields included, matching the behaviour the web form relies on.
pub async fn create_reimbursement_endpoint<R, M>(
    State(state): State<AppState<R, M>>,
    Json(body): Json<Value>,
) -> Response
where
    R: ReimbursementStore,
    M: Mailer,
{
    let fields = (
        string_field(&body, "name"),
        string_field(&body, "amount"),
        string_field(&body, "receipt"),
    );
    let (Some(name), Some(raw_amount), Some(receipt)) = fields else {
        tracing::info!("refusing to create reimbursement with missing fields: {body}");
        return (StatusCode::IM_A_TEAPOT, Json(body)).into_response();
    };

    let amount = match parse_amount(&raw_amount) {
        Ok(amount) => amount,
        Err(error) => return error.into_response(),
    };

    match state.store.create(&name, amount, &receipt) {
        Ok(reimbursement) => {
            tracing::info!("created reimbursement {reimbursement:?}");
            Redirect::to(endpoints::AUTH_VIEW).into_response()
        }
        Err(error) => error.into_response(),
    }
}

/// A route handler for closing reimbursements.
///
/// All open (uploaded or submitted) reimbursements matching the given name
/// and amount are set to closed. Matching zero records is a no-op, not an
/// error.
pub async fn close_reimbursement_endpoint<R, M>(
    State(state): State<AppState<R, M>>,
    Json(body): Json<Value>,
) -> Response
where
    R: ReimbursementStore,
    M: Mailer,
{
    let fields = (string_field(&body, "name"), string_field(&body, "amount"));
    let (Some(name), Some(raw_amount)) = fields else {
        tracing::info!("refusing to close reimbursement with missing fields: {body}");
        return (StatusCode::IM_A_TEAPOT, Json(body)).into_response();
    };

    let amount = match parse_amount(&raw_amount) {
        Ok(amount) => amount,
        Err(error) => return error.into_response(),
    };

    match state
        .store
        .set_status(&name, amount, &OPEN_STATUSES, Status::Closed)
    {
        Ok(count) => {
            tracing::info!("closed {count} reimbursement(s) named {name:?} for ${amount}");
            Redirect::to(endpoints::AUTH_VIEW).into_response()
        }
        Err(error) => error.into_response(),
    }
}

/// A route handler for listing all open (uploaded or submitted)
/// reimbursements.
pub async fn get_open_reimbursements<R, M>(
    State(state): State<AppState<R, M>>,
) -> Result<Json<Vec<Reimbursement>>, Error>
where
    R: ReimbursementStore,
    M: Mailer,
{
    state.store.get_by_status(&OPEN_STATUSES).map(Json)
}

/// A route handler for listing all uploaded reimbursements.
pub async fn get_uploaded_reimbursements<R, M>(
    State(state): State<AppState<R, M>>,
) -> Result<Json<Vec<Reimbursement>>, Error>
where
    R: ReimbursementStore,
    M: Mailer,
{
    state.store.get_by_status(&[Status::Uploaded]).map(Json)
}

/// A route handler for listing all submitted reimbursements.
pub async fn get_submitted_reimbursements<R, M>(
    State(state): State<AppState<R, M>>,
) -> Result<Json<Vec<Reimbursement>>, Error>
where
    R: ReimbursementStore,
    M: Mailer,
{
    state.store.get_by_status(&[Status::Submitted]).map(Json)
}

/// A route handler for listing all closed reimbursements.
pub async fn get_closed_reimbursements<R, M>(
    State(state): State<AppState<R, M>>,
) -> Result<Json<Vec<Reimbursement>>, Error>
where
    R: ReimbursementStore,
    M: Mailer,
{
    state.store.get_by_status(&[Status::Closed]).map(Json)
}
