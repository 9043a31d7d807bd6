//! Scenario tests for the terminal binary and the public counter API.

mod cli_tests;
