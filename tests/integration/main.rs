//! Integration test binary: every integration test lives in one binary.
//!
//! Each test runs the real gateway on an ephemeral port against wiremock
//! stand-ins for Twilio and the LLM providers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

mod config_toml;
mod gateway_http;
mod sms_flow;
