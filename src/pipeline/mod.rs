//! Pipeline stages of an acceptance run.
//!
//! Each submodule talks to exactly one service. Keeping stages separate
//! makes each independently testable and lets the driver in
//! [`crate::run`] stay a plain sequence of calls.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ anonymize ──▶ upload (auth + create)
//! (file)    (job ref,    (/run)        (/token, /create)
//!            poll loop)
//! ```
//!
//! 1. [`input`]    : read the source document into memory
//! 2. [`extract`]  : submit it and poll the job until the text is complete;
//!    the only stage with state
//! 3. [`anonymize`]: one call through the algorithm pipeline
//! 4. [`upload`]   : password-grant token, then the authenticated upload

pub mod anonymize;
pub mod extract;
pub mod input;
pub mod upload;
