//! # Agent Console
//!
//! A conversational front end for a fleet of five backend agents. Each
//! message typed by the user is classified by keyword into one target
//! agent, sent to that agent's HTTP API, and the outcome is recorded in a
//! transcript as a human-readable reply.
//!
//! ## Architecture
//!
//! ```text
//!   user text ──▶ ┌────────────┐   ┌──────────────┐   ┌────────────┐
//!   (+ file)      │  classify  │──▶│   dispatch   │──▶│  respond   │
//!                 │ keyword →  │   │ one HTTP req │   │ canned text│
//!                 │  target    │   │ per message  │   │ per target │
//!                 └────────────┘   └──────────────┘   └─────┬──────┘
//!                                                           ▼
//!                 ┌──────────────────────────────────────────────┐
//!                 │ session: transcript, staged file, one send   │
//!                 └──────┬───────────────────────────┬───────────┘
//!                        ▼                           ▼
//!                   ┌─────────┐                ┌──────────┐
//!                   │   CLI   │                │   HTTP   │
//!                   │ (acon)  │                │ chat API │
//!                   └─────────┘                └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! acon targets                             # list the agents
//! acon classify "How many laptops were sold?"
//! acon ask "Transform BestBuy data to Walmart format"
//! acon ask "" --file ./q3-report.pdf       # upload only
//! acon chat                                # interactive session
//! acon status                              # probe every agent
//! acon serve                               # HTTP chat API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`target`] | The five agents and their fixed metadata |
//! | [`classify`] | Ordered keyword routing |
//! | [`dispatch`] | HTTP calls to the agents |
//! | [`respond`] | Reply text per agent |
//! | [`session`] | Transcript, staged attachment, single-flight send |
//! | [`config`] | TOML configuration and environment overrides |
//! | [`export`] | Transcript export as JSON |
//! | [`health`] | Concurrent health sweep |
//! | [`chat`] | Terminal chat loop and one-shot ask |
//! | [`server`] | HTTP chat API |

pub mod chat;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod export;
pub mod health;
pub mod respond;
pub mod server;
pub mod session;
pub mod target;
