//! Integration test modules

mod session_flow;
