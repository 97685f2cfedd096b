//! The stage pipeline of a document workflow.
//!
//! ```text
//! extract ──▶ summarize ──▶ synthesize ──▶ illustrate ──▶ finalize
//! (text)      (summary)     (audio)        (image)        (completed)
//! ```
//!
//! [`stage`] holds the transition table: which status each stage accepts and
//! which it produces. [`executors`] binds each stage to the capability it
//! calls and turns the result into a record patch.

pub mod executors;
pub mod stage;
