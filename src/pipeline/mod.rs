//! Pipeline stages for indexing a document and answering questions about it.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and swapped (another embedder, another model backend) without touching
//! the others.
//!
//! ## Data Flow
//!
//! ```text
//! indexing:  input ──▶ extract ──▶ normalize ──▶ chunk ──▶ embed ──▶ index
//!            (upload)   (pdfium)    (cleanup)    (split)   (vectors) (store)
//!
//! answering: question ──▶ embed ──▶ index.search ──▶ llm (map × k, reduce)
//! ```
//!
//! 1. [`input`]     persist the upload under the working directory and
//!    check the `%PDF` magic bytes
//! 2. [`extract`]   pull per-page text with pdfium; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`normalize`] deterministic cleanup of extracted text
//! 4. [`chunk`]     bounded, overlapping character windows
//! 5. [`embed`]     text → vector through one of several backends
//! 6. [`index`]     immutable in-memory cosine-similarity index
//! 7. [`llm`]       hosted chat model calls under a deadline

pub mod chunk;
pub mod embed;
pub mod extract;
pub mod index;
pub mod input;
pub mod llm;
pub mod normalize;
