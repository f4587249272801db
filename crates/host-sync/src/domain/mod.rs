pub mod events;
pub mod machine;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod reconciler;
pub mod sink;
