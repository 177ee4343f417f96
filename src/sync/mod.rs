pub(crate) mod completion;

pub(crate) use completion::{channel, Listener, Notifier, Wake};
