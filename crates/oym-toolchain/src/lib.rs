//! External toolchain support for OYM.
//!
//! Both the markup converter and the diagram renderer shell out to external
//! programs. This crate provides the two things they share:
//!
//! - [`Probe`]: dependency discovery, with [`SystemProbe`] for real lookups
//!   and [`StaticProbe`] for tests
//! - [`run_with_timeout`]: spawn, capture, and kill on deadline

mod probe;
mod process;

pub use probe::{
    Probe, StaticProbe, SvgConverter, SystemProbe, TexToolchain, ToolchainError,
    discover_tex_toolchain,
};
pub use process::{DEFAULT_TIMEOUT, ExecError, ProcessOutput, run_with_timeout};
