use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Error,
    Info,
}

/// A short user-visible notification raised by an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Info,
            message: message.into(),
        }
    }
}

/// Toast channel sender: the dispatcher pushes notifications here.
pub type ToastSender = mpsc::Sender<Toast>;
/// Toast channel receiver: the front end drains and renders these.
pub type ToastReceiver = mpsc::Receiver<Toast>;

/// Create a toast channel with the given buffer size.
pub fn channel(buffer: usize) -> (ToastSender, ToastReceiver) {
    mpsc::channel(buffer.max(1))
}

/// Non-blocking send. A full or closed channel drops the toast; the action
/// result still carries the same message.
pub fn notify(tx: &ToastSender, toast: Toast) {
    if let Err(e) = tx.try_send(toast) {
        tracing::debug!(error = %e, "toast dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_level() {
        assert_eq!(Toast::success("ok").level, ToastLevel::Success);
        assert_eq!(Toast::error("no").level, ToastLevel::Error);
        assert_eq!(Toast::info("fyi").level, ToastLevel::Info);
    }

    #[tokio::test]
    async fn channel_send_recv() {
        let (tx, mut rx) = channel(4);
        notify(&tx, Toast::success("Task created"));
        let toast = rx.recv().await.unwrap();
        assert_eq!(toast.message, "Task created");
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (tx, mut rx) = channel(1);
        notify(&tx, Toast::info("first"));
        notify(&tx, Toast::info("second"));
        assert_eq!(rx.try_recv().unwrap().message, "first");
        assert!(rx.try_recv().is_err());
    }
}
