//! Redo is a file-oriented incremental build system.
//!
//! A target is built by running a companion `.do` script whose stdout
//! or `$3` file becomes the new target contents.  While it runs, the
//! script declares its own dependencies by invoking `redo-ifchange`,
//! `redo-ifcreate`, and `redo-always`; those declarations are recorded
//! in per-target metadata and consulted on the next invocation to
//! decide what actually needs rebuilding.

#![cfg_attr(feature = "strict", deny(warnings))]
#![cfg_attr(feature = "strict", deny(missing_docs))]

#[cfg(test)]
#[macro_use]
extern crate quickcheck;

#[macro_use]
extern crate clap;
#[macro_use]
extern crate lazy_static;
extern crate atty;
extern crate directories;
extern crate libc;
extern crate metrohash;
extern crate termcolor;

/// A module with just the version in it.
pub mod version;
pub mod printer;

pub mod build;
