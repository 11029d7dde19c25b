//! Process event handlers: the rendezvous wait and relay counters.

use crate::kernel::KernelHandle;
use crate::types::Result;
use serde_json::Value;

/// Wait for the next process creation.
///
/// Response body: `{"process_id", "parent_process_id", "image_name"}`.
pub async fn get_next_process_event(kernel: &KernelHandle) -> Result<Value> {
    let event = kernel.get_next_process_event().await?;
    tracing::debug!(
        process_id = %event.process_id,
        "returning process event over IPC"
    );
    Ok(serde_json::to_value(&event)?)
}

pub fn get_relay_stats(kernel: &KernelHandle) -> Result<Value> {
    Ok(serde_json::to_value(kernel.stats()?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Kernel;
    use crate::source::ManualNotifier;
    use crate::types::Error;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready_ok, task};

    #[test]
    fn test_event_body_shape() {
        let notifier = Arc::new(ManualNotifier::new());
        let kernel = Kernel::start(notifier.clone()).unwrap();
        let handle = kernel.handle();

        let mut call = task::spawn(get_next_process_event(&handle));
        assert_pending!(call.poll());
        notifier.emit_created(4242, 4, Some("/usr/bin/env"));

        let body = assert_ready_ok!(call.poll());
        assert_eq!(
            body,
            serde_json::json!({
                "process_id": 4242,
                "parent_process_id": 4,
                "image_name": "/usr/bin/env",
            })
        );
    }

    #[test]
    fn test_stats_body_and_stopped_kernel() {
        let mut kernel = Kernel::start(Arc::new(ManualNotifier::new())).unwrap();
        let handle = kernel.handle();

        let body = get_relay_stats(&handle).unwrap();
        assert_eq!(body["delivered"], 0);
        assert_eq!(body["dropped"], 0);

        kernel.stop().unwrap();
        assert!(matches!(get_relay_stats(&handle), Err(Error::Cancelled(_))));
    }
}
