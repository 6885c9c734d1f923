/// The consumer side's delivery callback.
///
/// The channel calls `deliver` after releasing its lock, either from inside
/// `produce` (on the producer's thread) when a request was pending, or from
/// inside `request_next` when a value was already buffered. Implementations
/// must therefore be cheap and tolerate being called from any thread.
pub trait Sink<T>: Send + Sync {
    /// Hands one value to the consumer.
    fn deliver(&self, value: T);

    /// End-of-stream: the channel was closed and will never deliver again.
    fn closed(&self) {}
}

impl<T, F> Sink<T> for F
where
    F: Fn(T) + Send + Sync,
{
    #[inline]
    fn deliver(&self, value: T) {
        self(value)
    }
}
