//! Shared test utilities for mailsort integration tests.
//!
//! This module provides:
//! - `TestHarness` with isolated download, ledger and send directories
//! - `FakeMailbox` and `FakeSender` standing in for IMAP and SMTP servers
//! - Builders for configurations and raw RFC 822 messages

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::*;
pub use harness::{jan_5, jan_6, TestHarness};
