//! AXM Context Formatter
//!
//! Renders a base prompt plus priority-sorted context attachments into the
//! single string handed to runners. Output is byte-for-byte deterministic.
//!
//! ```rust
//! use axm_context::format_context;
//! use axm_types::{ContextAttachment, Priority};
//!
//! let prompt = format_context(
//!     "Fix the build.",
//!     &[ContextAttachment::note("CI is red").with_priority(Priority::High)],
//! );
//! assert_eq!(
//!     prompt,
//!     "Fix the build.\n\n<context type=\"note\" priority=\"high\">\nCI is red\n</context>"
//! );
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod format;

pub use format::{escape_attr, format_context, render_attachment, render_formatted, BLOCK_SEPARATOR};
