//! Integration tests for the session core.

mod route_guard_test;
mod session_flow_test;
mod test_harness;
