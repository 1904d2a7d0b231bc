//! Keep local git checkouts in sync with a remote reference and run commands on updates.
//!
//! ## How it works
//!
//! `gitdeploy` is built up from **sessions**. Every session owns one checkout
//! and wires a **trigger** to a **synchronizer** and a **runner**. Triggers are
//! long running background processes that decide when to update (for example
//! on an interval, or on a webhook request). The synchronizer fetches and checks
//! out the followed branch or tag, and the runner starts the configured commands
//! (e.g. rebuilding a site).
//!
//! ```ignore
//! +---------+       +--------------+       +--------+
//! | trigger | ----> | synchronizer | ----> | runner |
//! +---------+       +--------------+       +--------+
//! ```
//!
//! Every component gets the same [context::Context], cancelling it stops every session.

/// The branch or tag a repository follows (e.g. [a fixed tag](reference::ReferenceSpec::Tag)
/// or [the latest tag of a branch](reference::ReferenceSpec::LatestTagOfBranch)).
pub mod reference;
/// A synchronizer keeps the checkout up to date (e.g. [with git](repository::GitSynchronizer)).
pub mod repository;
/// The commands that run after every update (e.g. [in a process group](commands::CommandRunner)).
pub mod commands;
/// A trigger is a long running background process, which initiates the updates
/// (e.g. [on an interval](triggers::interval::IntervalTrigger) or
/// [on a webhook](triggers::webhook::WebhookTrigger)).
pub mod triggers;

/// A session binds a repository, its trigger and its commands.
pub mod session;
/// The main program loop, that runs the sessions until cancelled.
pub mod start;

/// The cancellation shared between the sessions.
pub mod context;
/// Cancelling on termination signals.
pub mod signal;
