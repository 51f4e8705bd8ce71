//! Per-source scraping strategies.

mod github;
mod local;
mod npm;
mod pypi;
mod web;

pub use github::GitHubStrategy;
pub use local::LocalFileStrategy;
pub use npm::NpmStrategy;
pub use pypi::PypiStrategy;
pub use web::WebStrategy;
