//! Shared doubles for the session integration tests.

pub mod mock_jobs;
pub mod mock_push;

pub use mock_jobs::MockJobApi;
pub use mock_push::MockPushTransport;
