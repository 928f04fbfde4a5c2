//! `livemark-core` provides the runtime pieces behind livemark's live views.
//!
//! Markdown parsing and the widget itself live in `livemark-markdown`; this crate only knows how
//! to schedule work, notify observers, and draw styled lines into a `ratatui` buffer.
//!
//! ## Design goals
//!
//! - Event-loop agnostic: the host owns the loop and implements [`schedule::Scheduler`] (or uses
//!   the bundled [`schedule::EventLoop`]).
//! - No async runtime: everything runs on one thread (`Rc`/`RefCell`, not `Send`).
//! - Coalesced updates: [`schedule::UpdateScheduler`] turns bursts of change notifications into a
//!   single deferred flush.
//!
//! Useful entry points:
//! - [`signal::Signal`]: ordered observer registration.
//! - [`schedule::EventLoop`] + [`schedule::UpdateScheduler`]: deferred, coalesced flushes.
//! - [`viewport::ViewportState`] + [`render::render_spans_clipped`]: scrolling and drawing.
pub mod error;
pub mod theme;

pub mod render;
pub mod schedule;
pub mod signal;
pub mod viewport;

pub use error::Error;
pub use error::Result;
