//! Deterministic identifier derivation.
//!
//! Every derived entity's ID is a pure function of its parent video ID and
//! its index. No randomness, no clock reads — this is what lets a crashed
//! and restarted job converge on the same row set as one that ran once.

use std::fmt;

/// The kinds of derived entity an index-based ID can be minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Scene,
    Frame,
    Segment,
}

impl EntityKind {
    fn as_str(self) -> &'static str {
        match self {
            EntityKind::Scene => "scene",
            EntityKind::Frame => "frame",
            EntityKind::Segment => "segment",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the ID for a scene/frame/segment: `"{video_id}_{kind}_{idx:03d}"`.
///
/// Zero-padded to at least 3 digits; wider for `idx >= 1000` (Rust's `{:03}`
/// format already does this — it is a minimum width, not a truncation).
pub fn derive_id(video_id: &str, kind: EntityKind, idx: u32) -> String {
    format!("{video_id}_{kind}_{idx:03}")
}

/// Derive a frame caption's ID by appending `_caption` to its frame's ID.
pub fn caption_id(frame_id: &str) -> String {
    format!("{frame_id}_caption")
}
