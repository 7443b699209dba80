//! **slurmail-notify** — job lifecycle email notifications.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |---|---|
//! | [`error`] | Error handling |
//! | [`config`] | Environment-driven configuration (`SLURM_EMAIL_*`, `$HOME/.env`) |
//! | [`duration`] | Human-readable duration formatting |
//! | [`compose`] | Notification subject/body composition |
//! | [`notifier`] | One-shot delivery via `slurmail-smtp` |

pub mod error;
pub mod config;
pub mod duration;
pub mod compose;
pub mod notifier;
