use crate::error::RpcError;
use crate::platform::{Deployment, OperationHandle, OperationState, Platform};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// A deployment creation that is running on the platform.
pub struct Operation<'a> {
    platform: &'a dyn Platform,
    handle: OperationHandle,
    poll_interval: Duration,
}

impl<'a> Operation<'a> {
    pub fn new(platform: &'a dyn Platform, handle: OperationHandle, poll_interval: Duration) -> Self {
        Self {
            platform,
            handle,
            poll_interval,
        }
    }

    pub fn name(&self) -> &str {
        &self.handle.name
    }

    /// Blocks until the operation is done. There is no local timeout.
    pub fn poll_until_completed(&self) -> Result<OperationState, RpcError> {
        loop {
            let state = self.platform.get_operation(&self.handle)?;
            if state.done {
                return Ok(state);
            }

            debug!(operation = %self.name(), "operation still running");
            thread::sleep(self.poll_interval);
        }
    }

    /// Waits for the operation and returns the created deployment, or `None`
    /// if the operation failed or produced nothing.
    pub fn wait_for_result(&self) -> Result<Option<Deployment>, RpcError> {
        let state = self.poll_until_completed()?;
        if let Some(error) = &state.error {
            warn!(
                operation = %self.name(),
                code = error.code,
                "operation failed: {}",
                error.message
            );
        }
        Ok(state.response)
    }
}
