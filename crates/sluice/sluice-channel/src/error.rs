/// Errors returned by [`BoundedChannel`](crate::BoundedChannel) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The channel has been closed; no further production or requests are accepted.
    #[error("channel is closed")]
    Closed,

    /// A request was issued while another one was still outstanding.
    #[error("a request is already pending; only one outstanding request is allowed")]
    ProtocolViolation,

    /// A request was issued with no consumer sink attached.
    #[error("no consumer is attached to the channel")]
    Detached,

    /// A second consumer tried to attach to a single-consumer channel.
    #[error("a consumer is already attached to the channel")]
    AlreadyAttached,
}
