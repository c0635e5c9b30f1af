use std::fmt;

/// Coarse error taxonomy for the scheduler core. Mirrors spec §7: transient
/// RPC failures, model inconsistency, quorum loss, catastrophic failure, and
/// malformed protocol input are each given a distinct kind so callers can
/// decide whether to retry, degrade, or abort.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    InvalidInput,
    IOError,
    RpcFail,
    IPCFail,
    Unhealthy,
    Livelock,
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub msg: String,
}

impl Error {
    pub fn new(kind: ErrorKind, msg: String) -> Error {
        Error { kind, msg }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.msg)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Construct an `Err(Error)`, or wrap a fallible expression's error with
/// context. Two call shapes, matching the teacher's convention:
///
/// `err!(Kind, desc: "literal {}", arg)` builds an `Err` directly.
/// `err!(Kind, try: expr, "context {}", arg)` maps `expr`'s error into an
/// `Error` carrying that context; `err!(Kind, try: expr)` omits context.
#[macro_export]
macro_rules! err {
    ($kind:ident, desc: $($arg:tt)+) => {
        Err::<_, $crate::error::Error>($crate::error::Error::new(
            $crate::error::ErrorKind::$kind,
            format!($($arg)+),
        ))
    };
    ($kind:ident, try: $e:expr, $($arg:tt)+) => {
        match $e {
            Ok(val) => Ok(val),
            Err(err) => Err($crate::error::Error::new(
                $crate::error::ErrorKind::$kind,
                format!("{}: {}", format!($($arg)+), err),
            )),
        }
    };
    ($kind:ident, try: $e:expr) => {
        match $e {
            Ok(val) => Ok(val),
            Err(err) => Err($crate::error::Error::new(
                $crate::error::ErrorKind::$kind,
                err.to_string(),
            )),
        }
    };
}

/// Run a fallible expression purely for its side effect, logging (not
/// panicking) on error. Used on best-effort notification paths, e.g.
/// forwarding a fatal message up the `app_tx` channel.
#[macro_export]
macro_rules! allow_panic {
    ($prefix:expr, $e:expr) => {
        match $e {
            Ok(val) => val,
            Err(err) => {
                log::error!("{} unexpected error {}", $prefix, err);
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn err_desc_builds_err() {
        let r: Result<()> = err!(InvalidInput, desc: "bad value {}", 42);
        assert_eq!(r.unwrap_err().kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn err_try_wraps_context() {
        let parse: std::result::Result<u32, _> = "nope".parse::<u32>();
        let r: Result<u32> = err!(InvalidInput, try: parse, "parsing port");
        let e = r.unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidInput);
        assert!(e.msg.contains("parsing port"));
    }

    #[test]
    fn err_try_passes_through_ok() {
        let parse: std::result::Result<u32, _> = "7".parse::<u32>();
        let r: Result<u32> = err!(InvalidInput, try: parse);
        assert_eq!(r.unwrap(), 7);
    }
}
