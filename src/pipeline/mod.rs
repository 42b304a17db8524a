//! Pipeline stages for payslip extraction.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested alone and backends can be swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──▶ request ──▶ llm / openai ──▶ recover ──▶ validate
//! (bytes)   (render +     (contract)  (model call)     (JSON)      (record)
//!            encode)
//! ```
//!
//! 1. [`input`]: load bytes and detect the media type
//! 2. [`normalize`]: one PNG per document: images are re-encoded, PDFs have
//!    page one rasterised by [`render`] and encoded by [`encode`]
//! 3. [`request`]: instruction text + image + output contract
//! 4. [`llm`]: the [`llm::VisionModel`] seam and its edgequake-llm
//!    backend; [`openai`] is the strict function-call backend. The only
//!    stages with network I/O
//! 5. [`recover`]: staged recovery of one JSON object from noisy output
//! 6. [`validate`]: contract check producing a [`crate::record::PayslipRecord`]

pub mod encode;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod openai;
pub mod recover;
pub mod render;
pub mod request;
pub mod validate;
