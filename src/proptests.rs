//! Property-based tests for the text pipeline and the evaluation loop.
