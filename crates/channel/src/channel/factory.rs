use crate::channel::HttpChannel;

/// Sets up every channel a [`Connection`](super::Connection) creates.
///
/// The factory runs before the channel sees any input, so it is the place to
/// install callbacks. Any `FnMut(&mut HttpChannel) + Send` is a factory.
pub trait ChannelFactory: Send {
    fn init_channel(&mut self, channel: &mut HttpChannel);
}

impl<F> ChannelFactory for F
where
    F: FnMut(&mut HttpChannel) + Send,
{
    fn init_channel(&mut self, channel: &mut HttpChannel) {
        self(channel)
    }
}
