//! **slurmail-smtp** — one-shot async SMTP submission client.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | All data types, error handling, configuration |
//! | [`client`] | SMTP protocol engine (EHLO, STARTTLS, AUTH, DATA) |
//! | [`auth`] | SMTP authentication mechanisms (PLAIN, LOGIN, CRAM-MD5) |
//! | [`message`] | MIME message rendering (text, HTML alternative) |

pub mod types;
pub mod client;
pub mod auth;
pub mod message;
