//! Measures the cost of translating canonical messages into the provider
//! wire format. Adapted from the toolkit's `payload_conversion_bench.rs`:
//! same plain `std::time::Instant` manual timing, no criterion harness,
//! run with `cargo run --release --bin message_conversion_bench`.

use std::time::Instant;

use agentcore::core::convert::to_provider;
use agentcore::core::message::{Message, Part, Role};

fn build_conversation() -> Vec<Message> {
    let mut conversation = Vec::new();
    for i in 0..10 {
        conversation.push(Message::user_text(format!(
            "User message {i} - a question or statement from the user"
        )));
        conversation.push(Message::new(
            Role::Agent,
            vec![
                Part::text(format!(
                    "Assistant response {i} - a longer, detailed answer with examples"
                )),
                Part::data(serde_json::json!({"tool_calls": []})),
            ],
        ));
    }
    conversation
}

fn main() {
    let conversation = build_conversation();

    println!("Message Conversion Benchmark");
    println!("=============================\n");
    println!("Conversation size: {} messages", conversation.len());

    let iterations = 100_000;

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = to_provider(&conversation);
    }
    let duration = start.elapsed();

    println!("{} iterations", iterations);
    println!("Total time: {:?}", duration);
    println!("Per conversion: {:.2}µs", duration.as_micros() as f64 / iterations as f64);
    println!(
        "\nConversion as % of a 100ms network round trip: {:.5}%",
        (duration.as_micros() as f64 / iterations as f64) / 100_000.0 * 100.0
    );
}
