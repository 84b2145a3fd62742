//! Test suites for the pytables daemon.
