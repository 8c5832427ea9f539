//! # Sociograph
//!
//! A standing, rate-limited pipeline that crawls a social network's public
//! follow-graph for enrolled target accounts, persists the graph in SQLite,
//! derives mutual-follow relationships, and classifies followed accounts
//! into a fixed interest taxonomy with batched LLM calls.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌───────────┐
//! │ Scheduler │──▶│ Crawler  │──▶│  SQLite   │
//! │ quota/FIFO│   │ paginate │   │ graph+jobs│
//! └───────────┘   └────┬─────┘   └────┬──────┘
//!                      │              │
//!                 ┌────▼─────┐   ┌────▼──────────┐
//!                 │ProxyPool │   │ Mutuals +     │
//!                 │ rotation │   │ Interests/LLM │
//!                 └──────────┘   └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sgr init                        # create database and seed taxonomy
//! sgr enroll some_account         # queue profile/followers/following jobs
//! sgr scheduled                   # run the quota-governed dispatch loop
//! sgr manual some_account         # crawl one target end to end, now
//! sgr analysis                    # run the interest-classification loop
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | Follow-graph storage |
//! | [`jobs`] | Crawl job queue |
//! | [`proxy`] | Rotating proxy pool |
//! | [`client`] | Retrieval gateway seam |
//! | [`crawler`] | Paginated crawling with rate limiting |
//! | [`mutuals`] | Mutual-follow derivation |
//! | [`scheduler`] | Quota-governed dispatch |
//! | [`classifier`] | Classification seam |
//! | [`taxonomy`] | Fixed interest taxonomy |
//! | [`interests`] | Batched interest classification |
//! | [`pipeline`] | Run modes |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod classifier;
pub mod client;
pub mod config;
pub mod crawler;
pub mod db;
pub mod interests;
pub mod jobs;
pub mod migrate;
pub mod models;
pub mod mutuals;
pub mod pipeline;
pub mod proxy;
pub mod scheduler;
pub mod store;
pub mod taxonomy;
