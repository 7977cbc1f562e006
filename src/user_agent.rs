//! Default User-Agent string for download requests.

/// Product token used in the User-Agent header.
const PRODUCT: &str = "rangeget";

/// Default User-Agent for download requests (identifies the tool).
#[must_use]
pub(crate) fn default_download_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PRODUCT}/{version} (resumable-download-engine)")
}
