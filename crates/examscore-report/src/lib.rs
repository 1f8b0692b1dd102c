//! examscore-report: Report rendering.
//!
//! Renders exam reports as self-contained HTML pages and content defects as
//! SARIF for CI annotation.

pub mod html;
pub mod sarif;

pub use html::{generate_html, write_html_report};
pub use sarif::{generate_sarif, write_sarif_report};
