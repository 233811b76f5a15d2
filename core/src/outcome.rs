//! Discriminated result of a coordination operation.

use crate::error::Rejection;

/// What an operation did, when it did not fault.
///
/// Orchestrator operations return `Result<Outcome<T>, FacilityError>`:
/// `Ok(Completed)` is success, `Ok(Rejected)` is an expected business
/// refusal with no mutation, and `Err` is a fault.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// Operation took effect.
    Completed(T),
    /// Operation was declined without mutation.
    Rejected(Rejection),
}

impl<T> Outcome<T> {
    /// Whether the operation took effect.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Whether the operation was declined.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The rejection, if any.
    #[must_use]
    pub const fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(r) => Some(r),
            Self::Completed(_) => None,
        }
    }

    /// Convert into a `Result`, treating a rejection as the error.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] if the operation was declined.
    pub fn into_result(self) -> Result<T, Rejection> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Rejected(r) => Err(r),
        }
    }

    /// Transform the completed value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Completed(value) => Outcome::Completed(f(value)),
            Self::Rejected(r) => Outcome::Rejected(r),
        }
    }
}

impl<T> From<Rejection> for Outcome<T> {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected(rejection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_keeps_rejection() {
        let rejected: Outcome<i32> = Rejection::NoBayAvailable.into();
        assert_eq!(rejected.map(|v| v + 1), Outcome::Rejected(Rejection::NoBayAvailable));

        let done = Outcome::Completed(1).map(|v| v + 1);
        assert_eq!(done.into_result(), Ok(2));
    }
}
