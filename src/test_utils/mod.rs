//! Shared test utilities for the element index.
//!
//! Used by unit tests and by the suites under `tests/`.

pub mod fakes;
pub mod fixtures;
pub mod logging;

pub use fakes::{FakeCollectionApi, FakeFailure, FakePortfolioApi, StaticBuilder, entry};
pub use fixtures::{PortfolioFixture, element_markdown};
pub use logging::{TestLogger, init_test_tracing};
