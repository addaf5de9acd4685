use std::error;
use std::fmt;

/// Convenient result type for environment bootstrap operations using [`EnvError`]
/// as the error type.
pub type EnvResult<T> = Result<T, EnvError>;

/// Main error type for webhook environment operations.
///
/// [`EnvError`] can represent a single classified error, an error with
/// additional dynamic detail (usually the identity of the owning resource),
/// or multiple aggregated errors. Callers branch on [`EnvError::kind`] rather
/// than on concrete source types.
#[derive(Debug, Clone)]
pub struct EnvError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Error with kind and static description
    WithDescription(ErrorKind, &'static str),
    /// Error with kind, static description, and dynamic detail
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    /// Multiple aggregated errors
    Many(Vec<EnvError>),
}

/// Specific categories of errors that can occur while bootstrapping a webhook
/// environment.
///
/// Kinds are organized by functional area so callers can distinguish, for
/// example, a policy timeout from an explicit cancellation.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration Errors
    ConfigError,
    MissingField,

    // Certificate Issuance Errors
    IssuanceFailed,
    IoError,

    // Tree Expression Errors
    ExpressionParseFailed,
    ExpressionEvalFailed,
    ExpressionTypeMismatch,

    // Network & Readiness Errors
    EndpointUnreachable,
    EndpointUnhealthy,
    ReadyTimeout,
    OperationCancelled,
    InvalidUrl,

    // Cluster Errors
    ClusterRequestFailed,
    AlreadyExists,
    UpdateConflict,

    // Serialization Errors
    SerializationError,
    DeserializationError,

    // State & Workflow Errors
    InvalidState,

    // Unknown / Uncategorized
    Unknown,
}

impl EnvError {
    /// Creates an [`EnvError`] containing multiple aggregated errors.
    pub fn many(errors: Vec<EnvError>) -> EnvError {
        EnvError {
            repr: ErrorRepr::Many(errors),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or
    /// [`ErrorKind::Unknown`] if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::Many(ref errors) => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => vec![kind],
            ErrorRepr::Many(ref errors) => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// The detail usually carries the identity of the resource that owned the
    /// failing operation. For multiple errors, returns the detail of the
    /// first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::Many(ref errors) => errors.iter().find_map(|e| e.detail()),
            _ => None,
        }
    }

    /// Returns a copy of this error whose detail is prefixed with the owning
    /// resource's identity.
    ///
    /// Layers use this to qualify errors bubbling up from below, so the final
    /// message names every resource on the failure path.
    pub fn with_resource(self, resource: &str) -> EnvError {
        let repr = match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                ErrorRepr::WithDescriptionAndDetail(kind, desc, resource.to_string())
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, detail) => {
                ErrorRepr::WithDescriptionAndDetail(kind, desc, format!("{resource}: {detail}"))
            }
            many @ ErrorRepr::Many(_) => many,
        };

        EnvError { repr }
    }
}

impl PartialEq for EnvError {
    fn eq(&self, other: &EnvError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::WithDescription(kind_a, _), ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::Many(errors_a), ErrorRepr::Many(errors_b)) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;

                Ok(())
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;
                f.write_str(" -> ")?;
                detail.fmt(f)?;

                Ok(())
            }
            ErrorRepr::Many(ref errors) => {
                if errors.is_empty() {
                    write!(f, "Multiple errors occurred (empty)")?;
                } else if errors.len() == 1 {
                    errors[0].fmt(f)?;
                } else {
                    write!(f, "Multiple errors occurred ({} total):", errors.len())?;
                    for (i, error) in errors.iter().enumerate() {
                        write!(f, "\n  {}: {}", i + 1, error)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl error::Error for EnvError {}

/// Creates an [`EnvError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for EnvError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> EnvError {
        EnvError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

/// Creates an [`EnvError`] from an error kind, static description, and dynamic detail.
impl From<(ErrorKind, &'static str, String)> for EnvError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> EnvError {
        EnvError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

/// Creates an [`EnvError`] from a vector of errors for aggregation.
impl<E> From<Vec<E>> for EnvError
where
    E: Into<EnvError>,
{
    fn from(errors: Vec<E>) -> EnvError {
        EnvError {
            repr: ErrorRepr::Many(errors.into_iter().map(Into::into).collect()),
        }
    }
}

/// Converts [`std::io::Error`] to [`EnvError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for EnvError {
    fn from(err: std::io::Error) -> EnvError {
        EnvError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::IoError,
                "I/O error occurred",
                err.to_string(),
            ),
        }
    }
}

/// Converts [`serde_json::Error`] to [`EnvError`] with appropriate error kind.
impl From<serde_json::Error> for EnvError {
    fn from(err: serde_json::Error) -> EnvError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            _ => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        EnvError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, err.to_string()),
        }
    }
}

/// Converts [`rcgen::Error`] to [`EnvError`] with [`ErrorKind::IssuanceFailed`].
impl From<rcgen::Error> for EnvError {
    fn from(err: rcgen::Error) -> EnvError {
        EnvError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::IssuanceFailed,
                "certificate generation failed",
                err.to_string(),
            ),
        }
    }
}

/// Converts [`url::ParseError`] to [`EnvError`] with [`ErrorKind::InvalidUrl`].
impl From<url::ParseError> for EnvError {
    fn from(err: url::ParseError) -> EnvError {
        EnvError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::InvalidUrl,
                "URL parsing failed",
                err.to_string(),
            ),
        }
    }
}

/// Converts [`reqwest::Error`] to [`EnvError`] with [`ErrorKind::EndpointUnreachable`].
///
/// A transport-level failure is always retryable from the poller's point of
/// view; the policy deadline, not this conversion, decides when to give up.
impl From<reqwest::Error> for EnvError {
    fn from(err: reqwest::Error) -> EnvError {
        EnvError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::EndpointUnreachable,
                "HTTP request failed",
                err.to_string(),
            ),
        }
    }
}

/// Converts [`kube::Error`] to [`EnvError`] with appropriate error kind.
///
/// An API-level 409 maps to [`ErrorKind::AlreadyExists`] for a duplicate
/// create and to [`ErrorKind::UpdateConflict`] for an update race, so the
/// orchestrator can tolerate the former and report the latter distinctly;
/// everything else maps to [`ErrorKind::ClusterRequestFailed`].
impl From<kube::Error> for EnvError {
    fn from(err: kube::Error) -> EnvError {
        let kind = match &err {
            kube::Error::Api(response) if response.code == 409 => {
                if response.reason == "AlreadyExists" {
                    ErrorKind::AlreadyExists
                } else {
                    ErrorKind::UpdateConflict
                }
            }
            _ => ErrorKind::ClusterRequestFailed,
        };

        EnvError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                kind,
                "cluster API request failed",
                err.to_string(),
            ),
        }
    }
}
