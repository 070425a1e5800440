//! Engine status reporting.
//!
//! Every engine call made by this crate passes its status through
//! [`check_status`] or [`check`]. Teardown paths use [`report_teardown`],
//! which logs instead of failing.

use crate::engine::{Diagnostics, Reply, Status};
use crate::error::{FetchError, FetchResult};
use tracing::{error, warn};

/// Fail with an engine error if `status` denotes failure.
///
/// `SuccessWithInfo` and `NoData` are not failures.
pub fn check_status<D>(diag: &D, status: Status, operation: &str) -> FetchResult<()>
where
    D: Diagnostics + ?Sized,
{
    match status {
        Status::Success | Status::NoData => Ok(()),
        Status::SuccessWithInfo => {
            if let Some(info) = diag.last_error() {
                warn!(operation, code = info.code, "{}", info.message);
            }
            Ok(())
        }
        failure => Err(engine_error(diag, failure, operation)),
    }
}

/// Check a reply's status and unwrap its value.
pub fn check<T, D>(diag: &D, reply: Reply<T>, operation: &str) -> FetchResult<T>
where
    D: Diagnostics + ?Sized,
{
    check_status(diag, reply.status, operation)?;
    reply.value.ok_or_else(|| {
        FetchError::engine(
            operation,
            reply.status.code(),
            format!("{} returned no value", reply.status),
        )
    })
}

/// Report a failed release without propagating it.
pub fn report_teardown<D>(diag: &D, status: Status, operation: &str)
where
    D: Diagnostics + ?Sized,
{
    if status.is_failure() {
        let err = engine_error(diag, status, operation);
        error!("{}", err);
    }
}

fn engine_error<D>(diag: &D, status: Status, operation: &str) -> FetchError
where
    D: Diagnostics + ?Sized,
{
    match (status, diag.last_error()) {
        (Status::Error, Some(record)) => FetchError::engine(operation, record.code, record.message),
        (status, _) => FetchError::engine(operation, status.code(), status.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Diagnostic;

    struct Handle(Option<Diagnostic>);

    impl Diagnostics for Handle {
        fn last_error(&self) -> Option<Diagnostic> {
            self.0.clone()
        }
    }

    #[test]
    fn test_success_codes_pass() {
        let h = Handle(Some(Diagnostic::new(24347, "warning: NULL column in aggregate")));
        assert!(check_status(&h, Status::Success, "fetch").is_ok());
        assert!(check_status(&h, Status::SuccessWithInfo, "fetch").is_ok());
        assert!(check_status(&h, Status::NoData, "fetch").is_ok());
    }

    #[test]
    fn test_error_carries_diagnostic() {
        let h = Handle(Some(Diagnostic::new(1007, "ORA-01007: variable not in select list")));
        let err = check_status(&h, Status::Error, "define").unwrap_err();
        match err {
            FetchError::Engine {
                operation,
                code,
                message,
            } => {
                assert_eq!(operation, "define");
                assert_eq!(code, 1007);
                assert_eq!(message, "ORA-01007: variable not in select list");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_invalid_handle_without_record() {
        let h = Handle(None);
        let err = check_status(&h, Status::InvalidHandle, "describe").unwrap_err();
        assert_eq!(err.to_string(), "describe: INVALID_HANDLE");
    }

    #[test]
    fn test_teardown_failure_returns_normally() {
        let h = Handle(Some(Diagnostic::new(21500, "ORA-21500: internal error code")));
        report_teardown(&h, Status::Error, "free_descriptor(LOB)");
        report_teardown(&h, Status::InvalidHandle, "free_define");
        report_teardown(&h, Status::Success, "free_define");
    }

    #[test]
    fn test_check_unwraps_value() {
        let h = Handle(None);
        assert_eq!(check(&h, Reply::with_info(7usize), "count").unwrap(), 7);
        let missing: Reply<usize> = Reply {
            status: Status::Success,
            value: None,
        };
        assert!(check(&h, missing, "count").is_err());
    }
}
