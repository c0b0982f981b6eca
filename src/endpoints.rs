//! The API endpoints URIs.

/// The landing page.
pub const ROOT: &str = "/";
/// The main page with the reimbursement form and lists.
pub const AUTH_VIEW: &str = "/auth";
/// The route for static files.
pub const STATIC: &str = "/static";

/// The route to create a reimbursement.
pub const NEW_REIMBURSEMENT: &str = "/api/new_reimbursement";
/// The route to close reimbursements by name and amount.
pub const CLOSE_REIMBURSEMENT: &str = "/api/close_reimbursement";
/// The route to list open (uploaded or submitted) reimbursements.
pub const OPEN_REIMBURSEMENTS: &str = "/api/open_reimbursements";
/// The route to list submitted reimbursements.
pub const SUBMITTED_REIMBURSEMENTS: &str = "/api/submitted_reimbursements";
/// The route to list uploaded reimbursements.
pub const UPLOADED_REIMBURSEMENTS: &str = "/api/uploaded_reimbursements";
/// The route to list closed reimbursements.
pub const CLOSED_REIMBURSEMENTS: &str = "/api/closed_reimbursements";
/// The route to trigger the balance report manually.
pub const EMAIL: &str = "/api/email";
/// The route to trigger the close-check reminder manually.
pub const EMAIL_REMINDER: &str = "/api/email/reminder";
