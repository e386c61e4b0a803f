//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/api/pf/processed_files/{file_id}/download',
//! use [format_endpoint].

/// The route for logging in a user.
pub const LOG_IN_API: &str = "/api/log_in";
/// The route for the client to log out the current user.
pub const LOG_OUT: &str = "/api/log_out";
/// The route for registering a user.
pub const REGISTER: &str = "/api/auth/register";
/// The route for changing the signed-in user's password.
pub const CHANGE_PASSWORD: &str = "/api/auth/change_password";
/// The route for the signed-in user's details.
pub const CURRENT_USER: &str = "/api/auth/users/me";
/// The route for listing every user.
pub const USERS: &str = "/api/users";

/// The route for uploading a folder of payroll spreadsheets for one scheme.
pub const PROCESS_FOLDER: &str = "/api/{scheme}/process_folder";
/// The route for listing the processed files of a month.
pub const PROCESSED_FILES: &str = "/api/{scheme}/processed_files";
/// The route for downloading one artifact of a processed file.
pub const DOWNLOAD_FILE: &str = "/api/{scheme}/processed_files/{file_id}/download";
/// The route for downloading the artifacts of several processed files as a zip archive.
pub const BATCH_DOWNLOAD: &str = "/api/{scheme}/processed_files/batch_download";
/// The route for submitting the remittance of a processed file.
pub const SUBMIT_REMITTANCE: &str = "/api/{scheme}/processed_files/{file_id}/submit_remittance";
/// The route for downloading the remittance challan of a processed file.
pub const REMITTANCE_CHALLAN: &str = "/api/{scheme}/processed_files/{file_id}/remittance_challan";

/// The route for the remitted amount per month of a financial year.
pub const MONTHLY_AMOUNTS: &str = "/api/dashboard/monthly_amounts";
/// The route for the totals, counts and averages of a financial year.
pub const SUMMARY_STATS: &str = "/api/dashboard/summary_stats";
/// The route for the submission timelines of a financial year.
pub const SUBMISSIONS_DATA: &str = "/api/dashboard/submissions_data";
/// The route for the remittance delays of a financial year.
pub const DELAYED_SUBMISSIONS: &str = "/api/dashboard/delayed_submissions";
/// The route for the financial years that have remittances.
pub const YEAR_LIST: &str = "/api/dashboard/year_list";
/// The route for the average day of the month remittances are made on.
pub const REMITTANCE_DAYS: &str = "/api/dashboard/remittance_days";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/users/{user_id}', '{user_id}' is the parameter.
///
/// Only the first parameter is replaced. Use [format_scheme_endpoint] for
/// endpoints that start with a `{scheme}` parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: impl ToString) -> String {
    let Some(param_start) = endpoint_path.find('{') else {
        return endpoint_path.to_string();
    };

    let param_end = endpoint_path[param_start..]
        .find('}')
        .map(|offset| param_start + offset + 1)
        .unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id.to_string(),
        &endpoint_path[param_end..]
    )
}

/// Replace the `{scheme}` parameter with `scheme` and then the next
/// parameter, if any, with `id`.
pub fn format_scheme_endpoint(endpoint_path: &str, scheme: &str, id: Option<i64>) -> String {
    let path = format_endpoint(endpoint_path, scheme);

    match id {
        Some(id) => format_endpoint(&path, id),
        None => path,
    }
}
