//! Additional assertions for [`spectral`]

use mos_integration_tests::WaitError;
use spectral::{AssertionFailure, Spec};
use std::fmt::Debug;

/// Additional assertions for Vec
pub trait ExtendedVecAssertions {
    fn is_not_empty(&mut self);
}

impl<'s, T: 's> ExtendedVecAssertions for Spec<'s, Vec<T>>
where
    T: Debug,
{
    /// Asserts that the subject vector is not empty.
    ///
    /// ```rust
    /// let test_vec: Vec<u8> = vec![1];
    /// assert_that(&test_vec).is_not_empty();
    /// ```
    fn is_not_empty(&mut self) {
        if self.subject.is_empty() {
            AssertionFailure::from_spec(self)
                .with_expected(String::from("a non-empty vec"))
                .with_actual(String::from("an empty vec"))
                .fail();
        }
    }
}

/// Assertions for the outcome of a wait
pub trait WaitResultAssertions {
    fn is_timeout(&mut self);
    fn is_probe_error(&mut self);
}

impl<'s> WaitResultAssertions for Spec<'s, Result<(), WaitError>> {
    /// Asserts that the wait timed out.
    fn is_timeout(&mut self) {
        if !matches!(self.subject, Err(error) if error.is_timeout()) {
            AssertionFailure::from_spec(self)
                .with_expected(String::from("a timeout"))
                .with_actual(format!("{:?}", self.subject))
                .fail();
        }
    }

    /// Asserts that the wait was aborted by an error of the probe.
    fn is_probe_error(&mut self) {
        if !matches!(self.subject, Err(error) if error.is_probe_error()) {
            AssertionFailure::from_spec(self)
                .with_expected(String::from("an aborted wait"))
                .with_actual(format!("{:?}", self.subject))
                .fail();
        }
    }
}
