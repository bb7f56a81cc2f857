//! Trait surfaces describing the collaborators injected into the webvigil
//! engine. The core never depends on a concrete backend; anything that can
//! satisfy these contracts can be wired in.

pub mod analyze;
pub mod diff;
pub mod notify;
pub mod report;
pub mod store;

/// Frequently used contract imports for composition roots and tests.
pub mod prelude {
    pub use super::analyze::{JsAnalyzer, JsFinding};
    pub use super::diff::Differ;
    pub use super::notify::Notifier;
    pub use super::report::HtmlDiffReporter;
    pub use super::store::HistoryStore;
}

pub use analyze::{JsAnalyzer, JsFinding};
pub use diff::Differ;
pub use notify::Notifier;
pub use report::HtmlDiffReporter;
pub use store::HistoryStore;
