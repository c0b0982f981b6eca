use std::{env, net::SocketAddr};

use axum::{
    Router,
    extract::{MatchedPath, Request},
};
use axum_server::Handle;
use clap::Parser;
use rusqlite::Connection;
use time::UtcOffset;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use reimburser::{
    MailSettings, Scheduler, SendGridMailer, build_router, create_app_state, graceful_shutdown,
};

/// The reimbursement tracker server.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// The port to serve the app from.
    #[arg(short, long, default_value_t = 8071)]
    port: u16,

    /// The offset from UTC, in hours, used for the mail schedule and subject
    /// line dates.
    #[arg(long, default_value_t = 0)]
    utc_offset: i8,
}

#[tokio::main]
async fn main() {
    setup_logging();

    let args = Args::parse();

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let utc_offset = UtcOffset::from_hms(args.utc_offset, 0, 0)
        .expect("--utc-offset must be between -23 and 23 hours");

    let api_key = env::var("SENDGRID_API_KEY")
        .expect("The environment variable 'SENDGRID_API_KEY' must be set");
    let mail_settings = MailSettings {
        payer_email: env::var("PAYER_EMAIL")
            .expect("The environment variable 'PAYER_EMAIL' must be set"),
        paid_email: env::var("PAID_EMAIL")
            .expect("The environment variable 'PAID_EMAIL' must be set"),
        from_email: env::var("FROM_EMAIL")
            .expect("The environment variable 'FROM_EMAIL' must be set"),
    };

    let connection = Connection::open(&args.db_path).expect("Could not open the database");
    let state = create_app_state(
        connection,
        SendGridMailer::new(api_key),
        mail_settings,
        utc_offset,
    )
    .expect("Could not initialize the database");

    let mut scheduler = Scheduler::new(state.clone());
    scheduler.start();

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = add_tracing_layer(build_router(state));

    tracing::info!("HTTP server listening on {}", addr);
    axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .expect("Could not serve the app");

    scheduler.stop();
}

fn setup_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_filter(filter::LevelFilter::INFO),
        )
        .init();
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // By default, `TraceLayer` will log 5xx responses but we're doing our
        // specific logging of errors so disable that
        .on_failure(());

    router.layer(tracing_layer)
}
