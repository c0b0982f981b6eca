//! Application router configuration.

use axum::{
    Router,
    response::Html,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use crate::{
    AppState, endpoints,
    mail::Mailer,
    reimbursement::{
        close_reimbursement_endpoint, create_reimbursement_endpoint, get_closed_reimbursements,
        get_open_reimbursements, get_submitted_reimbursements, get_uploaded_reimbursements,
    },
    report::{post_email_endpoint, post_reminder_endpoint},
    store::ReimbursementStore,
};

/// Return a router with all the app's routes.
pub fn build_router<R, M>(state: AppState<R, M>) -> Router
where
    R: ReimbursementStore,
    M: Mailer,
{
    Router::new()
        .route(endpoints::ROOT, get(get_index_page))
        .route(endpoints::AUTH_VIEW, get(get_auth_page))
        .route(
            endpoints::NEW_REIMBURSEMENT,
            post(create_reimbursement_endpoint::<R, M>),
        )
        .route(
            endpoints::CLOSE_REIMBURSEMENT,
            post(close_reimbursement_endpoint::<R, M>),
        )
        .route(
            endpoints::OPEN_REIMBURSEMENTS,
            get(get_open_reimbursements::<R, M>),
        )
        .route(
            endpoints::SUBMITTED_REIMBURSEMENTS,
            get(get_submitted_reimbursements::<R, M>),
        )
        .route(
            endpoints::UPLOADED_REIMBURSEMENTS,
            get(get_uploaded_reimbursements::<R, M>),
        )
        .route(
            endpoints::CLOSED_REIMBURSEMENTS,
            get(get_closed_reimbursements::<R, M>),
        )
        .route(endpoints::EMAIL, post(post_email_endpoint::<R, M>))
        .route(
            endpoints::EMAIL_REMINDER,
            post(post_reminder_endpoint::<R, M>),
        )
        .nest_service(endpoints::STATIC, ServeDir::new("static/"))
        .with_state(state)
}

/// Serve the landing page.
async fn get_index_page() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

/// Serve the main page with the reimbursement form and lists.
async fn get_auth_page() -> Html<&'static str> {
    Html(include_str!("../static/auth.html"))
}

#[cfg(test)]
mod routing_tests {
    use axum_test::TestServer;
    use rusqlite::Connection;
    use serde_json::json;

    use crate::{
        MailSettings, MockMailer, Status, build_router, endpoints, store::create_app_state,
    };

    fn new_test_server() -> (TestServer, MockMailer) {
        let connection =
            Connection::open_in_memory().expect("Could not open in-memory SQLite database");
        let mailer = MockMailer::new();
        let state = create_app_state(
            connection,
            mailer.clone(),
            MailSettings::test_settings(),
            time::UtcOffset::UTC,
        )
        .expect("Could not create app state");

        let server = TestServer::new(build_router(state));

        (server, mailer)
    }

    #[tokio::test]
    async fn index_and_auth_pages_are_served() {
        let (server, _) = new_test_server();

        server.get(endpoints::ROOT).await.assert_status_ok();
        server.get(endpoints::AUTH_VIEW).await.assert_status_ok();
    }

    #[tokio::test]
    async fn email_trigger_reports_nothing_sent_for_empty_store() {
        let (server, mailer) = new_test_server();

        let response = server.post(endpoints::EMAIL).await;

        response.assert_status_ok();
        response.assert_json(&json!({ "sent": false }));
        assert_eq!(mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn email_trigger_runs_the_balance_report() {
        let (server, mailer) = new_test_server();
        server
            .post(endpoints::NEW_REIMBURSEMENT)
            .json(&json!({ "name": "Taxi", "amount": "$10", "receipt": "r1" }))
            .await
            .assert_status_see_other();

        let response = server.post(endpoints::EMAIL).await;

        response.assert_status_ok();
        response.assert_json(&json!({ "sent": true }));
        assert_eq!(mailer.sent_count(), 1);
        assert!(mailer.sent()[0].text.contains("Taxi (r1): $10"));
    }

    #[tokio::test]
    async fn reminder_trigger_runs_the_close_check_reminder() {
        let (server, mailer) = new_test_server();
        server
            .post(endpoints::NEW_REIMBURSEMENT)
            .json(&json!({ "name": "Taxi", "amount": "$10", "receipt": "r1" }))
            .await
            .assert_status_see_other();

        let response = server.post(endpoints::EMAIL_REMINDER).await;

        response.assert_status_ok();
        response.assert_json(&json!({ "sent": true }));
        assert_eq!(mailer.sent()[0].to, "paid@example.com");
    }

    /// The full lifecycle: upload, report, re-report, close.
    #[tokio::test]
    async fn reimbursement_lifecycle_end_to_end() {
        let (server, mailer) = new_test_server();

        server
            .post(endpoints::NEW_REIMBURSEMENT)
            .json(&json!({ "name": "Taxi", "amount": "$10", "receipt": "r1" }))
            .await
            .assert_status_see_other();

        let uploaded: Vec<crate::Reimbursement> = server
            .get(endpoints::UPLOADED_REIMBURSEMENTS)
            .await
            .json();
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0].amount, 10.0);
        assert_eq!(uploaded[0].status, Status::Uploaded);

        server.post(endpoints::EMAIL).await.assert_status_ok();

        let first_report = &mailer.sent()[0];
        assert!(first_report.text.contains("New:\nTaxi (r1): $10"));
        assert!(first_report.text.contains("Total Outstanding: $10.00"));

        let submitted: Vec<crate::Reimbursement> = server
            .get(endpoints::SUBMITTED_REIMBURSEMENTS)
            .await
            .json();
        assert_eq!(submitted.len(), 1);

        server.post(endpoints::EMAIL).await.assert_status_ok();

        let second_report = &mailer.sent()[1];
        assert!(second_report.text.contains("New:\nNone"));
        assert!(
            second_report
                .text
                .contains("Previously Submitted:\nTaxi (r1): $10")
        );

        server
            .post(endpoints::CLOSE_REIMBURSEMENT)
            .json(&json!({ "name": "Taxi", "amount": "10" }))
            .await
            .assert_status_see_other();

        // Everything is closed, so the next report run sends nothing.
        let response = server.post(endpoints::EMAIL).await;
        response.assert_json(&json!({ "sent": false }));
        assert_eq!(mailer.sent_count(), 2);
    }
}
