//! Channel catalog for an audio-player host.
//!
//! The registry itself is domain-agnostic; this module fixes the channel
//! vocabulary that the canonical host - an audio-player front end -
//! dispatches on. Payloads are plain serde-serializable data so hosts can
//! log or persist them. The player's state machine lives with the host,
//! not here: it calls [`EventRegistry::dispatch`](crate::EventRegistry::dispatch)
//! once per transition, after the new state is in place.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::Channel;

/// The track a playback event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Stable track identifier.
    pub track_id: Uuid,
    /// Track title.
    pub title: String,
    /// Performing artist.
    pub artist: String,
    /// Total track length.
    pub duration: Duration,
}

impl TrackInfo {
    /// Describe a track with a fresh identifier and unknown length.
    #[must_use]
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            track_id: Uuid::new_v4(),
            title: title.into(),
            artist: artist.into(),
            duration: Duration::ZERO,
        }
    }

    /// Set the track length.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Position within the current track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackProgress {
    /// Elapsed play time.
    pub elapsed: Duration,
    /// Total track length.
    pub duration: Duration,
}

/// Why playback came to a stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The track played to its end.
    Finished,
    /// The listener stopped playback.
    UserAction,
    /// Decoding or audio output failed.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

/// Final record of a playback run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopInfo {
    /// Position reached before stopping.
    pub position: Duration,
    /// When playback stopped.
    pub stopped_at: DateTime<Utc>,
    /// Why playback stopped.
    pub reason: StopReason,
}

/// Playback began for a new track.
#[derive(Debug, Clone, Copy)]
pub struct Started;

impl Channel for Started {
    type Payload = TrackInfo;

    fn name() -> &'static str {
        "playback_started"
    }
}

/// Playback paused mid-track.
#[derive(Debug, Clone, Copy)]
pub struct Paused;

impl Channel for Paused {
    type Payload = PlaybackProgress;

    fn name() -> &'static str {
        "playback_paused"
    }
}

/// Playback stopped and the player returned to idle.
#[derive(Debug, Clone, Copy)]
pub struct Stopped;

impl Channel for Stopped {
    type Payload = StopInfo;

    fn name() -> &'static str {
        "playback_stopped"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        assert_eq!(<Started as Channel>::name(), "playback_started");
        assert_eq!(<Paused as Channel>::name(), "playback_paused");
        assert_eq!(<Stopped as Channel>::name(), "playback_stopped");
    }

    #[test]
    fn test_stop_reason_serializes_tagged() {
        let reason = StopReason::Error {
            message: "decoder stall".to_string(),
        };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["reason"], "error");
        assert_eq!(json["message"], "decoder stall");

        let finished = serde_json::to_value(&StopReason::Finished).unwrap();
        assert_eq!(finished["reason"], "finished");
    }

    #[test]
    fn test_track_builder() {
        let track =
            TrackInfo::new("Blue in Green", "Miles Davis").with_duration(Duration::from_secs(337));
        assert_eq!(track.artist, "Miles Davis");
        assert_eq!(track.duration, Duration::from_secs(337));
    }
}
