//! Pure decisions of the reconciler.
//!
//! Given the stored runtime state and what a platform reports, decide which
//! effect a message should undergo. Nothing here performs any I/O.

use api::{Content, FeedStatus, LiveStatus, LiveStream, Vod};
use common::RuntimeState;

/// What to do with the message of a live subscription.
#[derive(Debug, PartialEq)]
pub enum LiveAction<'a> {
    /// Post a new message for the stream.
    Create(&'a LiveStream),
    /// Refresh the posted message with the current stream.
    Edit {
        message_id: &'a str,
        stream: &'a LiveStream,
    },
    /// Retract the posted message.
    Delete { message_id: &'a str },
    /// Turn the posted message into its archived form.
    Archive { message_id: &'a str, vod: &'a Vod },
    /// Stop tracking the posted message without touching it.
    Forget,
    /// Nothing to do.
    Nothing,
}

/// What to do for a content feed subscription.
#[derive(Debug, PartialEq)]
pub enum FeedAction<'a> {
    /// Announce content which has not been announced before.
    Announce(&'a Content),
    Nothing,
}

/// Decide the action for a live subscription.
pub fn live<'a>(state: &'a RuntimeState, keep_vod: bool, status: &'a LiveStatus) -> LiveAction<'a> {
    let message_id = state.message_id.as_deref();

    match (message_id, status) {
        (None, LiveStatus::Live(stream)) => LiveAction::Create(stream),
        (Some(message_id), LiveStatus::Live(stream)) => LiveAction::Edit { message_id, stream },
        (Some(message_id), LiveStatus::Offline(..)) if !keep_vod => {
            LiveAction::Delete { message_id }
        }
        (Some(message_id), LiveStatus::Offline(Some(vod)))
            if state.terminal_id.as_deref() == Some(vod.id.as_str()) =>
        {
            LiveAction::Archive { message_id, vod }
        }
        (Some(..), LiveStatus::Offline(..)) => LiveAction::Forget,
        (None, LiveStatus::Offline(..)) => LiveAction::Nothing,
        (_, LiveStatus::NotFound | LiveStatus::TransientError(..)) => LiveAction::Nothing,
    }
}

/// Decide the action for a content feed subscription.
pub fn feed<'a>(state: &'a RuntimeState, status: &'a FeedStatus) -> FeedAction<'a> {
    match status {
        FeedStatus::Latest(content) if state.terminal_id.as_deref() != Some(content.id.as_str()) => {
            FeedAction::Announce(content)
        }
        _ => FeedAction::Nothing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn state(message_id: Option<&str>, terminal_id: Option<&str>) -> RuntimeState {
        RuntimeState::new(message_id.map(Into::into), terminal_id.map(Into::into))
    }

    #[test]
    fn test_live_creates_then_edits() {
        let status = LiveStatus::Live(testing::stream("s123"));

        assert!(matches!(
            live(&state(None, None), false, &status),
            LiveAction::Create(stream) if stream.stream_id == "s123"
        ));

        assert!(matches!(
            live(&state(Some("m1"), Some("s123")), false, &status),
            LiveAction::Edit { message_id: "m1", .. }
        ));
    }

    #[test]
    fn test_offline_without_keep_vod_deletes() {
        let status = LiveStatus::Offline(Some(testing::vod("s123")));

        assert_eq!(
            live(&state(Some("m1"), Some("s123")), false, &status),
            LiveAction::Delete { message_id: "m1" }
        );

        assert_eq!(
            live(&state(Some("m1"), Some("s123")), false, &LiveStatus::Offline(None)),
            LiveAction::Delete { message_id: "m1" }
        );
    }

    #[test]
    fn test_offline_with_keep_vod() {
        let matching = LiveStatus::Offline(Some(testing::vod("s123")));
        let other = LiveStatus::Offline(Some(testing::vod("s999")));
        let stored = state(Some("m1"), Some("s123"));

        assert!(matches!(
            live(&stored, true, &matching),
            LiveAction::Archive { message_id: "m1", vod } if vod.id == "s123"
        ));
        assert_eq!(live(&stored, true, &other), LiveAction::Forget);
        assert_eq!(live(&stored, true, &LiveStatus::Offline(None)), LiveAction::Forget);
    }

    #[test]
    fn test_nothing_to_do() {
        let offline = LiveStatus::Offline(Some(testing::vod("s123")));
        assert_eq!(live(&state(None, None), true, &offline), LiveAction::Nothing);
        assert_eq!(live(&state(None, Some("s123")), true, &offline), LiveAction::Nothing);

        let stored = state(Some("m1"), Some("s123"));
        assert_eq!(live(&stored, false, &LiveStatus::NotFound), LiveAction::Nothing);
        assert_eq!(
            live(&stored, false, &LiveStatus::TransientError("timeout".into())),
            LiveAction::Nothing
        );
    }

    #[test]
    fn test_feed() {
        let status = FeedStatus::Latest(testing::content("v2"));

        assert!(matches!(feed(&state(None, None), &status), FeedAction::Announce(c) if c.id == "v2"));
        assert!(matches!(feed(&state(None, Some("v1")), &status), FeedAction::Announce(..)));
        assert_eq!(feed(&state(None, Some("v2")), &status), FeedAction::Nothing);
        assert_eq!(feed(&state(None, Some("v2")), &FeedStatus::NotFound), FeedAction::Nothing);
        assert_eq!(
            feed(&state(None, None), &FeedStatus::TransientError("5xx".into())),
            FeedAction::Nothing
        );
    }
}
