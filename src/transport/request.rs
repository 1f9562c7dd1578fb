use crate::error::TransportError;

type Finish<'a> = Box<dyn FnOnce() -> Result<(), TransportError> + 'a>;

/// Handle to a posted non-blocking operation.
///
/// The request borrows the buffer it was posted on for `'a`, so the buffer
/// cannot be read or posted on again until the request has been consumed by
/// [`Request::wait`] or [`wait_all`].
#[must_use = "a posted operation must be joined with `wait` before its buffer is reused"]
pub struct Request<'a> {
    operation: &'static str,
    completion: Option<Finish<'a>>,
}

impl<'a> Request<'a> {
    /// A request that finishes by running `completion` when joined
    pub fn deferred(
        operation: &'static str,
        completion: impl FnOnce() -> Result<(), TransportError> + 'a,
    ) -> Self {
        Request {
            operation,
            completion: Some(Box::new(completion)),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.completion.is_some()
    }

    /// Block until the operation completes and release the buffer
    pub fn wait(mut self) -> Result<(), TransportError> {
        match self.completion.take() {
            Some(complete) => complete(),
            None => Ok(()),
        }
    }
}

impl Drop for Request<'_> {
    fn drop(&mut self) {
        if let Some(complete) = self.completion.take() {
            log::warn!(
                "{} request dropped without wait; joining it now",
                self.operation
            );
            if let Err(e) = complete() {
                log::error!("{} request failed while being dropped: {}", self.operation, e);
            }
        }
    }
}

impl std::fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("operation", &self.operation)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Join every request, in order. All requests are joined even if one fails;
/// the first failure is returned.
pub fn wait_all<'a>(requests: impl IntoIterator<Item = Request<'a>>) -> Result<(), TransportError> {
    let mut first_error = None;
    for request in requests {
        if let Err(e) = request.wait() {
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_wait_runs_completion_once() {
        let runs = Cell::new(0);
        let request = Request::deferred("receive", || {
            runs.set(runs.get() + 1);
            Ok(())
        });
        assert!(request.is_pending());
        request.wait().unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_drop_joins_pending_request() {
        let runs = Cell::new(0);
        {
            let _request = Request::deferred("receive", || {
                runs.set(runs.get() + 1);
                Ok(())
            });
        }
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_wait_all_joins_everything_and_reports_first_error() {
        let runs = Cell::new(0);
        let requests = vec![
            Request::deferred("receive", || {
                runs.set(runs.get() + 1);
                Err(TransportError::Disconnected { peer: 1 })
            }),
            Request::deferred("send", || Ok(())),
            Request::deferred("broadcast", || {
                runs.set(runs.get() + 1);
                Err(TransportError::Disconnected { peer: 2 })
            }),
        ];

        let result = wait_all(requests);
        assert_eq!(result, Err(TransportError::Disconnected { peer: 1 }));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_request_holds_buffer_until_joined() {
        let mut buffer = vec![0.0; 3];
        let request = Request::deferred("receive", || {
            buffer.copy_from_slice(&[1.0, 2.0, 3.0]);
            Ok(())
        });
        request.wait().unwrap();
        assert_eq!(buffer, vec![1.0, 2.0, 3.0]);
    }
}
