//! Shared helpers for latchkey-core integration tests.

#![allow(dead_code)]

pub mod harness;
