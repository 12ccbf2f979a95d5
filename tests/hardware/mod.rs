//! Hardware-specific tests requiring real devices.
//!
//! These tests are ignored by default and should be run manually with the
//! `--ignored` flag on a rig with modems or readers attached.
