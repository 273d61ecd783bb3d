//! # Snapshot Embed
//!
//! Turns the style of a cloned document subtree into self-contained CSS by
//! replacing every external resource reference (fonts, images, imported
//! style sheets) with an inline `data:` URL, so the subtree can later be
//! rasterized without network access.
//!
//! ## Pipeline
//!
//! | Stage | Module | Role |
//! |-------|--------|------|
//! | URL resolution | [`url_resolver`] | Absolute URLs from relative and protocol-relative references |
//! | Resource cache | [`resource_cache`] | One fetch per cache key, failures cached as placeholders |
//! | Rule extraction | [`css_rules`] | Top-level rule blocks recovered from raw style sheet text |
//! | Style sheet cache | [`stylesheet_cache`] | One download per style sheet URL |
//! | Font embedding | [`font_embed`] | `url()` rewriting under a global deadline |
//! | Web fonts | [`web_fonts`] | Import inlining, font-face collection, `<style>` insertion |
//!
//! ## Features
//!
//! - **Request collapsing**: concurrent callers share a single in-flight fetch
//! - **Failure caching**: a failed resource is never retried for the life of the cache
//! - **Bounded waiting**: font embedding returns after 5 seconds with whatever has arrived
//! - **Order independence**: rewrites are applied in one pass, whatever order fetches finish in
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snapshot_embed::{Config, EmbedService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let service = EmbedService::new(&config)?;
//!
//!     let sheet = service.fetch_style_sheet_text("https://example.com/fonts.css", &config.options);
//!     let css = service.embed_fonts(&sheet, &config.options).await?;
//!     println!("{css}");
//!
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ### Embed the fonts of a remote style sheet
//! ```bash
//! snapshot-embed fonts --stylesheet https://example.com/fonts.css --output fonts.css
//! ```
//!
//! ### Produce font-face CSS for a local sheet
//! ```bash
//! snapshot-embed inline --input site.css --base-url https://example.com/ --prefer-format woff2
//! ```

/// Configuration and embedding options
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Network access behind the `ResourceFetcher` trait
pub mod fetcher;

/// Resolution of CSS references to absolute URLs
pub mod url_resolver;

/// MIME lookup, data URL and base64 helpers
pub mod utils;

/// Deduplicating cache for binary resources
pub mod resource_cache;

/// Pattern-based recovery of CSS rule blocks
pub mod css_rules;

/// Deduplicating cache for style sheet text
pub mod stylesheet_cache;

/// In-memory document, style sheet and element model
pub mod document;

/// Inline embedding of `url()` references
pub mod font_embed;

/// Web font collection and `<style>` insertion
pub mod web_fonts;

/// Command-line interface implementation
pub mod cli;

#[cfg(test)]
mod tests;

pub use cli::*;
pub use config::*;
pub use css_rules::*;
pub use document::*;
pub use error::*;
pub use fetcher::*;
pub use font_embed::*;
pub use resource_cache::*;
pub use stylesheet_cache::*;
pub use url_resolver::*;
pub use utils::*;
pub use web_fonts::*;
