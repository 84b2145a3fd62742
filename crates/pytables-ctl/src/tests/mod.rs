//! Test suites for the control tool.

mod lifecycle_behaviour;
