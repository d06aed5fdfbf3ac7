//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `serve`    | `Serve`          |
//! | `timeline` | `Timeline`       |
//! | `config`   | `Config`         |

pub mod config;
pub mod serve;
pub mod timeline;

pub use config::cmd_config;
pub use serve::cmd_serve;
pub use timeline::cmd_timeline;
