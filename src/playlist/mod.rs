//! Keeps playlist directories under the download root in step with the
//! membership rows.

mod reconciler;

pub use reconciler::{MatchRemoval, PlaylistReconciler};
