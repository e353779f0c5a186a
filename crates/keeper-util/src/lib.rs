#![forbid(unsafe_code)]
//! Hashing, filesystem, process, Maven and jar helpers for Keeper.

pub mod artifact;
pub mod error;
pub mod fs;
pub mod hash;
pub mod jar;
pub mod maven;
pub mod process;
