//! Asynchronous server messages and their handler.

use crate::error::{Error, ErrorFields};

/// Asynchronous message from the server.
///
/// These can arrive at any time, between or during queries.
#[derive(Debug)]
pub enum AsyncMessage {
    /// Non-fatal notice/warning from server.
    Notice(ErrorFields),

    /// Notification from LISTEN/NOTIFY.
    Notification {
        /// PID of the notifying backend process
        pid: u32,
        /// Channel name
        channel: String,
        /// Notification payload
        payload: String,
    },

    /// Server parameter value changed after startup.
    ParameterChanged {
        /// Parameter name
        name: String,
        /// New value
        value: String,
    },

    /// ERROR response that arrived while no statement was running.
    Error(Error),
}

/// Handler for asynchronous messages.
///
/// Any `FnMut(AsyncMessage) + Send` closure is a handler.
pub trait AsyncMessageHandler: Send {
    fn handle(&mut self, message: AsyncMessage);
}

impl<F> AsyncMessageHandler for F
where
    F: FnMut(AsyncMessage) + Send,
{
    fn handle(&mut self, message: AsyncMessage) {
        self(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_handler() {
        let mut seen = Vec::new();
        {
            let mut handler = |message: AsyncMessage| {
                if let AsyncMessage::Notification { channel, .. } = message {
                    seen.push(channel);
                }
            };
            handler.handle(AsyncMessage::Notification {
                pid: 7,
                channel: "jobs".into(),
                payload: String::new(),
            });
            handler.handle(AsyncMessage::Notice(ErrorFields::default()));
        }
        assert_eq!(seen, ["jobs"]);
    }
}
