//! Test doubles shared by the integration scenarios.

pub mod mock_rpc;

pub use mock_rpc::MockRpc;
