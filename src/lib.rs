//! RLCP grading server.
//!
//! RLCP is a line-header-plus-XML-body protocol spoken by grading servers:
//! one socket exchange per request, four methods (Generate, Check,
//! Calculate, Echo). This crate provides:
//!
//! - the protocol model and codec (`protocol`, `methods`, `xml`):
//!   header/body framing tolerant of mixed line endings, the XML body schema
//!   with comment-carried payloads, round-trip serialization;
//! - the concurrent connection server (`server`): one task per connection,
//!   authentication against configured users, method dispatch, status-coded
//!   error responses;
//! - the flow engine (`flow`): per-request and per-check-unit deadlines with
//!   cooperative cancellation, graceful degradation when no processor is
//!   registered;
//! - the processor interfaces and registry (`processor`): the capability
//!   traits grading logic implements, supplied to the server by embedding
//!   crates.
//!
//! The stock binary (`main.rs`) runs the server with an empty registry;
//! real deployments build their own binary, register processors and call
//! [`server::Server::run`].

pub mod config;
pub mod error;
pub mod flow;
pub mod methods;
pub mod processor;
pub mod protocol;
pub mod server;
pub mod xml;
