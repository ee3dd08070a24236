//! Operator methods on sources.

use flow_core::{BoxSource, Source, SourceExt};

use crate::concat::Concat;
use crate::map_to::MapTo;

/// Combinators available on every sized source.
pub trait OperatorExt: Source + Sized + 'static {
    /// Emit this source's values, then each of `others` in turn.
    fn concat_with<I>(self, others: I) -> Concat<Self::Item>
    where
        I: IntoIterator<Item = BoxSource<Self::Item>>,
    {
        Concat::new(std::iter::once(self.boxed()).chain(others))
    }

    /// Replace every value with a clone of `value`.
    fn map_to<R>(self, value: R) -> MapTo<Self, R>
    where
        R: Clone + Send + Sync + 'static,
    {
        MapTo::new(self, value)
    }
}

impl<S: Source + Sized + 'static> OperatorExt for S {}
