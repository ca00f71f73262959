//! Integration tests: full scan and grading pipeline over a mock store.

mod mock_store;
mod pipeline;
