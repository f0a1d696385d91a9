//! Property-based tests for transfer guarantees
