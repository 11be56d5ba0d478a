//! taleforge-core: task lifecycle and stage coordination for long-running
//! content generation jobs.
//!
//! ```text
//! submit ──► Orchestrator ──► TaskStore (Pending)
//!                 │
//!                 └─ spawn ──► StageRunner ──► Stage::execute (per step)
//!                                  │               │
//!                                  │◄── delta ─────┘
//!                                  ├─► TaskRegistry (checkpoint)
//!                                  └─► TaskStore    (checkpoint / terminal)
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod stage;
pub mod store;
pub mod task;
