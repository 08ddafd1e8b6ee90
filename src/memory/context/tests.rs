use super::*;
use crate::database::{Collection, Record, RecordMetadata};
use crate::session::Role;
use chrono::{Duration, TimeZone, Utc};

fn memory(text: &str, score: f32) -> RetrievedResult {
    RetrievedResult {
        record: Record {
            id: text.to_string(),
            collection: Collection::Knowledge,
            vector: vec![1.0],
            text: text.to_string(),
            metadata: RecordMetadata::default(),
            created_at: Utc::now(),
        },
        score,
    }
}

fn turns(author: &str, texts: &[&str]) -> Vec<ChatTurn> {
    let start = Utc
        .with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
        .single()
        .expect("valid date");
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| ChatTurn {
            author: author.to_string(),
            role: Role::User,
            text: (*text).to_string(),
            timestamp: start + Duration::minutes(i as i64),
        })
        .collect()
}

#[test]
fn empty_inputs_give_empty_context() {
    let context = ContextAssembler::new(500).assemble(&[], &[], &[]);
    assert!(context.is_empty());
    assert_eq!(context, AssembledContext::default());
}

#[test]
fn full_layout_when_everything_fits() {
    let retrieved = vec![memory("tea is brewed at 80C", 0.9)];
    let history = turns("alice", &["hi", "how hot for tea?"]);
    let channel = turns("bob", &["coffee is better"]);

    let context = ContextAssembler::new(1_000).assemble(&retrieved, &history, &channel);

    assert_eq!(
        context.text,
        "Relevant memory:\n- tea is brewed at 80C\n\n\
         Conversation so far:\nalice: hi\nalice: how hot for tea?\n\n\
         Recent channel messages:\nbob: coffee is better"
    );
    assert_eq!(context.retrieved_used, 1);
    assert_eq!(context.history_used, 2);
    assert_eq!(context.channel_used, 1);
}

#[test]
fn knowledge_source_is_shown() {
    let mut result = memory("multi\nline   text", 0.8);
    result.record.metadata.source = Some("faq.md".to_string());

    let context = ContextAssembler::new(200).assemble(&[result], &[], &[]);
    assert_eq!(
        context.text,
        "Relevant memory:\n- multi line text (source: faq.md)"
    );
}

#[test]
fn output_never_exceeds_budget() {
    let retrieved: Vec<RetrievedResult> = (0..10)
        .map(|i| memory(&format!("memory number {}", i), 1.0 - i as f32 * 0.05))
        .collect();
    let history = turns("alice", &["one", "two", "three", "four", "five"]);
    let channel = turns("bob", &["six", "seven", "eight"]);

    for budget in [0, 10, 17, 40, 80, 120, 200, 400] {
        let context = ContextAssembler::new(budget).assemble(&retrieved, &history, &channel);
        assert!(
            context.text.chars().count() <= budget,
            "budget {} produced {} characters",
            budget,
            context.text.chars().count()
        );
    }
}

#[test]
fn budget_is_exact_at_the_boundary() {
    let retrieved = vec![memory("abc", 0.9)];
    // "Relevant memory:\n- abc" is 22 characters
    assert_eq!(
        ContextAssembler::new(22).assemble(&retrieved, &[], &[]).text,
        "Relevant memory:\n- abc"
    );
    assert!(ContextAssembler::new(21).assemble(&retrieved, &[], &[]).is_empty());
}

#[test]
fn items_are_whole_and_assembly_stops_at_first_misfit() {
    let retrieved = vec![
        memory("short", 0.9),
        memory(&"long ".repeat(40), 0.8),
        memory("tiny", 0.7),
    ];

    let context = ContextAssembler::new(60).assemble(&retrieved, &[], &[]);

    // "tiny" would fit but comes after the item that overflowed
    assert_eq!(context.text, "Relevant memory:\n- short");
    assert_eq!(context.retrieved_used, 1);
}

#[test]
fn priority_prefers_memory_then_recent_history() {
    let retrieved = vec![memory("fact", 0.9)];
    let history = turns("alice", &["oldest turn", "middle turn", "newest turn"]);
    let channel = turns("bob", &["chatter"]);

    // memory section (23) + separator (2) + history header and newest turn (41)
    let context = ContextAssembler::new(66).assemble(&retrieved, &history, &channel);

    assert_eq!(
        context.text,
        "Relevant memory:\n- fact\n\nConversation so far:\nalice: newest turn"
    );
    assert_eq!(context.history_used, 1);
    assert_eq!(context.channel_used, 0);
}

#[test]
fn history_renders_chronologically() {
    let history = turns("alice", &["first", "second", "third"]);
    let context = ContextAssembler::new(500).assemble(&[], &history, &[]);
    assert_eq!(
        context.text,
        "Conversation so far:\nalice: first\nalice: second\nalice: third"
    );
}

#[test]
fn assembly_is_deterministic() {
    let retrieved = vec![memory("a", 0.5), memory("b", 0.4)];
    let history = turns("alice", &["x", "y"]);
    let assembler = ContextAssembler::new(70);
    assert_eq!(
        assembler.assemble(&retrieved, &history, &[]),
        assembler.assemble(&retrieved, &history, &[])
    );
}
