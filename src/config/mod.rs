//! Crawler configuration
//!
//! One TOML file with `[user-agent]`, `[fetcher]`, `[dispatcher]` and
//! `[datastore]` sections, all keys kebab-case and optional. The loaded
//! [`Config`] is immutable and handed to each component's constructor.
//!
//! ```no_run
//! use rill::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("rill.toml")).unwrap();
//! println!("Fetchers: {}", config.fetcher.num_fetchers);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{Config, DatastoreConfig, DispatcherConfig, FetcherConfig, UserAgentConfig};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
