#[cfg(test)]
mod tests;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::database::RetrievedResult;
use crate::session::ChatTurn;

pub const MEMORY_HEADER: &str = "Relevant memory:";
pub const HISTORY_HEADER: &str = "Conversation so far:";
pub const CHANNEL_HEADER: &str = "Recent channel messages:";
const SECTION_SEPARATOR: &str = "\n\n";

/// Prompt context and how many items of each kind made it in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    pub retrieved_used: usize,
    pub history_used: usize,
    pub channel_used: usize,
}

impl AssembledContext {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Packs retrieved memory, conversation history and channel chatter into a
/// character budget.
///
/// Items are taken greedily in priority order: retrieved results as ranked,
/// then history newest first, then channel messages newest first. The first
/// item that does not fit ends assembly, and items are never truncated.
/// The budget covers the whole output, headings and separators included.
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    budget: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Part {
    Memory,
    History,
    Channel,
}

impl Part {
    fn header(self) -> &'static str {
        match self {
            Self::Memory => MEMORY_HEADER,
            Self::History => HISTORY_HEADER,
            Self::Channel => CHANNEL_HEADER,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Memory => 0,
            Self::History => 1,
            Self::Channel => 2,
        }
    }
}

impl ContextAssembler {
    #[inline]
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }

    #[inline]
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// `history` and `channel` are given oldest first, as kept by the session
    #[inline]
    pub fn assemble(
        &self,
        retrieved: &[RetrievedResult],
        history: &[ChatTurn],
        channel: &[ChatTurn],
    ) -> AssembledContext {
        let candidates = retrieved
            .iter()
            .map(|result| (Part::Memory, render_retrieved(result)))
            .chain(
                history
                    .iter()
                    .rev()
                    .map(|turn| (Part::History, render_turn(turn))),
            )
            .chain(
                channel
                    .iter()
                    .rev()
                    .map(|turn| (Part::Channel, render_turn(turn))),
            );

        let mut sections: [Vec<String>; 3] = Default::default();
        let mut used = 0;
        let mut open_sections = 0;

        for (part, line) in candidates {
            let section = &mut sections[part.index()];
            let line_len = line.chars().count();

            let cost = if section.is_empty() {
                let separator = if open_sections > 0 {
                    SECTION_SEPARATOR.len()
                } else {
                    0
                };
                separator + part.header().chars().count() + 1 + line_len
            } else {
                1 + line_len
            };

            if used + cost > self.budget {
                debug!(
                    "Context budget of {} reached after {} characters",
                    self.budget, used
                );
                break;
            }

            if section.is_empty() {
                open_sections += 1;
            }
            used += cost;
            section.push(line);
        }

        let [memory, mut history_lines, mut channel_lines] = sections;
        // selected newest first, shown oldest first
        history_lines.reverse();
        channel_lines.reverse();

        let assembled = AssembledContext {
            retrieved_used: memory.len(),
            history_used: history_lines.len(),
            channel_used: channel_lines.len(),
            text: [
                (Part::Memory, memory),
                (Part::History, history_lines),
                (Part::Channel, channel_lines),
            ]
            .into_iter()
            .filter(|(_, lines)| !lines.is_empty())
            .map(|(part, lines)| format!("{}\n{}", part.header(), lines.join("\n")))
            .join(SECTION_SEPARATOR),
        };

        debug!(
            "Assembled context: {} memories, {} turns, {} channel messages, {} characters",
            assembled.retrieved_used,
            assembled.history_used,
            assembled.channel_used,
            used
        );
        assembled
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().join(" ")
}

fn render_retrieved(result: &RetrievedResult) -> String {
    let text = single_line(&result.record.text);
    match result.record.metadata.source.as_deref() {
        Some(source) => format!("- {} (source: {})", text, source),
        None => format!("- {}", text),
    }
}

fn render_turn(turn: &ChatTurn) -> String {
    single_line(&turn.render())
}
