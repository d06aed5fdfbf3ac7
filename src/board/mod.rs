//! Release board server.
//!
//! ## Overview
//!
//! Stores product release schedules in SQLite, serves them over a JSON API,
//! and pushes a freshly computed dashboard to connected browsers whenever a
//! schedule changes or the refresh interval elapses.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │ Browser  │ ───────> │  server.rs  (axum Router, embedded page)         │
//! │          │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘ WebSocket│         │                                        │
//!                       │         │ ChangeFeed::publish()                  │
//!                       │         v                                        │
//!                       │  changes.rs  (ChangeFeed, TableSubscription)     │
//!                       │         │                                        │
//!                       │         │ releases events                        │
//!                       │         v                                        │
//!                       │  live.rs  (LiveDashboard, debounce + interval)   │
//!                       │         │                                        │
//!                       │         │ build_dashboard(local_now())           │
//!                       │         v                                        │
//!                       │  ws.rs  (WsMessage, broadcast_message)           │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module     | Responsibility                                          |
//! |------------|---------------------------------------------------------|
//! | `models`   | Row types, drafts, date parsing at the ingestion edge   |
//! | `db`       | SQLite access via `DbHandle` (thin `Arc<Mutex<_>>`)     |
//! | `storage`  | `ObjectStore` trait, local store, upload policy         |

pub mod api;
pub mod changes;
pub mod db;
pub mod live;
pub mod models;
pub mod server;
pub mod storage;
pub mod ws;

pub use server::start_server;
