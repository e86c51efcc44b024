//! Tick payload construction (§4.6.1 "Tick payload").

use fleet_types::{ChannelId, ChannelMessage};

pub const MAX_MESSAGES_PER_CHANNEL: usize = 20;
pub const MAX_SNIPPET_CHARS: usize = 400;

#[derive(Debug, Clone)]
pub struct ChannelDeltaBlock {
    pub channel_id: ChannelId,
    pub from_seq: u64,
    pub to_seq: u64,
    pub snippets: Vec<String>,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct TickPayload {
    pub agent_id: String,
    pub awake_duration_ms: i64,
    pub blocks: Vec<ChannelDeltaBlock>,
}

impl TickPayload {
    /// Renders the header/per-channel-blocks/trailer text the A2A message
    /// body carries (§4.6.1): "[header with state, awake duration],
    /// per-channel blocks [seq range and snippets], trailer (instructions
    /// to respond via channel-post and sleep if no work)".
    pub fn render(&self) -> String {
        let mut out = format!(
            "agent {} — awake {} ms\n",
            self.agent_id, self.awake_duration_ms
        );
        for block in &self.blocks {
            out.push_str(&format!(
                "\n[{}] seq {}..{}{}\n",
                block.channel_id,
                block.from_seq,
                block.to_seq,
                if block.truncated { " (truncated, showing latest)" } else { "" }
            ));
            for snippet in &block.snippets {
                out.push_str("  - ");
                out.push_str(snippet);
                out.push('\n');
            }
        }
        out.push_str("\nRespond via channel-post for any work item above, or call `sleep` if there is nothing to do.\n");
        out
    }
}

/// Builds the delta block for one channel given its messages with
/// `seq > sent_seq` (already ordered by `seq` ascending), capping the
/// enumeration at the most recent [`MAX_MESSAGES_PER_CHANNEL`] and
/// truncating each snippet to [`MAX_SNIPPET_CHARS`]. Returns `None` if there
/// is nothing new. The caller advances `sentSeq` to the returned `to_seq`
/// only after a successful dispatch (§4.6.1, §8 invariant 6).
pub fn build_delta_block(channel_id: ChannelId, new_messages: &[ChannelMessage]) -> Option<ChannelDeltaBlock> {
    if new_messages.is_empty() {
        return None;
    }
    let truncated = new_messages.len() > MAX_MESSAGES_PER_CHANNEL;
    let window = &new_messages[new_messages.len().saturating_sub(MAX_MESSAGES_PER_CHANNEL)..];
    let from_seq = window.first().map(|m| m.seq).unwrap_or(0);
    let to_seq = window.last().map(|m| m.seq).unwrap_or(0);
    let snippets = window
        .iter()
        .map(|m| {
            let mut content = m.content.clone();
            if content.chars().count() > MAX_SNIPPET_CHARS {
                content = content.chars().take(MAX_SNIPPET_CHARS).collect();
            }
            format!("#{} {}: {}", m.seq, m.agent_id, content)
        })
        .collect();
    Some(ChannelDeltaBlock {
        channel_id,
        from_seq,
        to_seq,
        snippets,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_types::ChannelId;

    fn msg(seq: u64, content: &str) -> ChannelMessage {
        ChannelMessage {
            channel_id: ChannelId::parse("proj").unwrap(),
            seq,
            agent_id: "alice".to_string(),
            content: content.to_string(),
            timestamp: seq as i64,
        }
    }

    #[test]
    fn no_new_messages_yields_no_block() {
        assert!(build_delta_block(ChannelId::parse("proj").unwrap(), &[]).is_none());
    }

    #[test]
    fn caps_at_twenty_most_recent_and_marks_truncated() {
        let messages: Vec<_> = (1..=25).map(|s| msg(s, "hi")).collect();
        let block = build_delta_block(ChannelId::parse("proj").unwrap(), &messages).unwrap();
        assert!(block.truncated);
        assert_eq!(block.snippets.len(), MAX_MESSAGES_PER_CHANNEL);
        assert_eq!(block.from_seq, 6);
        assert_eq!(block.to_seq, 25);
    }

    #[test]
    fn truncates_long_content_to_400_chars() {
        let long = "x".repeat(1_000);
        let messages = vec![msg(1, &long)];
        let block = build_delta_block(ChannelId::parse("proj").unwrap(), &messages).unwrap();
        assert!(!block.truncated);
        let snippet = &block.snippets[0];
        let body_len = snippet.split(": ").nth(1).unwrap().chars().count();
        assert_eq!(body_len, MAX_SNIPPET_CHARS);
    }
}
