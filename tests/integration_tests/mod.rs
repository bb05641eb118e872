//! End-to-end engine scenarios

mod error_scenarios;
mod pipeline_test;
