// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use tether_model::Message;

/// System instruction for the summary completion call.
pub const SUMMARIZE_SYSTEM_PROMPT: &str =
    "You are a conversation summarizer for a coding agent. Summarize the \
     conversation so far in a concise, information-dense way. Preserve all \
     technical details, decisions, file paths, code snippets, and tool \
     outputs that may matter for future work. The summary will replace the \
     original history to free up context space.";

/// Trailing user message appended after the prefix being summarized.
pub const SUMMARIZE_REQUEST: &str = "Summarize the conversation so far.";

/// Synthetic assistant acknowledgment inserted after the summary.
pub const SUMMARY_ACK: &str =
    "Understood. I have the context from the earlier conversation and will \
     continue from here.";

/// Summary returned when there is nothing old enough to compact.
pub const NOTHING_TO_COMPACT: &str = "Nothing to compact.";

/// Find the compaction cut index.
///
/// Walk from newest to oldest accumulating estimated tokens; once at
/// least `recent_budget` recent tokens are included, the cut is the first
/// User or Assistant message at-or-after that point — never a tool
/// result, because restoring a suffix whose tool call was summarized away
/// produces a dangling reference most backends reject.
///
/// Returns 0 (no-op) when the whole conversation fits the recent budget.
pub fn find_cut_index(messages: &[Message], recent_budget: usize) -> usize {
    let mut acc = 0usize;
    let mut reached: Option<usize> = None;
    for (i, m) in messages.iter().enumerate().rev() {
        acc += m.approx_tokens();
        if acc >= recent_budget {
            reached = Some(i);
            break;
        }
    }
    let Some(start) = reached else {
        return 0;
    };
    for (j, m) in messages.iter().enumerate().skip(start) {
        match m {
            Message::User { .. } | Message::Assistant { .. } => return j,
            Message::ToolResult { .. } => continue,
        }
    }
    0
}

/// Messages for the summary completion: the prefix plus the trailing
/// request.  The summarize instruction rides as the system prompt.
pub fn summary_request_messages(prefix: &[Message]) -> Vec<Message> {
    let mut messages = prefix.to_vec();
    messages.push(Message::user(SUMMARIZE_REQUEST));
    messages
}

/// Rebuild the conversation from a summary and the preserved suffix:
/// synthetic user summary, synthetic assistant acknowledgment, then the
/// recent exchanges verbatim.
pub fn rebuild_with_summary(summary: &str, suffix: Vec<Message>) -> Vec<Message> {
    let mut rebuilt = vec![
        Message::user(format!("[Previous conversation summary]\n{summary}")),
        Message::assistant(SUMMARY_ACK),
    ];
    rebuilt.extend(suffix);
    rebuilt
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
