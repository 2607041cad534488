//! Runs the code blocks in `README.md` as doctests.

#![cfg(doctest)]

#[doc = include_str!("../README.md")]
pub struct ReadmeDoctests;
