//! Testing utilities for the gateway
//!
//! - Alba-style HTTP endpoint testing without running a server
//! - In-memory wallet, device and secret store doubles
//! - [`TestGateway`], the whole router wired over those doubles
//!
//! # Example
//!
//! ```rust,ignore
//! use walletgate::testing::{self, TestGateway};
//!
//! #[tokio::test]
//! async fn test_balance() {
//!     let gateway = TestGateway::new().await;
//!     let token = gateway.login().await;
//!
//!     testing::get(gateway.router(), "/api/balance")
//!         .bearer_token(&token)
//!         .execute()
//!         .await
//!         .assert_ok()
//!         .assert_json();
//! }
//! ```

mod gateway;
mod scenario;
mod wallet;

pub use gateway::{MemorySecretStore, TEST_PASSWORD, TEST_USERNAME, TestGateway, test_codec};
pub use scenario::{Scenario, ScenarioAssert, get, post};
pub use wallet::{MockDialer, MockWallet, RecordingDevice};
