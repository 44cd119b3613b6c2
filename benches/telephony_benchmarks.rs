//! Performance benchmarks for the telephony server
//!
//! Run with: cargo bench
//! Or for specific benchmarks: cargo bench -- <filter>

use std::hint::black_box;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use waav_telephony::core::audio::{AudioCodec, MulawCodec, SilenceGate};
use waav_telephony::core::routing::{
    CallContext, RouteAction, RouteActionKind, Router, RoutingRule, RuleConditions, TimeWindowSpec,
};
use waav_telephony::core::speech::TextChunker;
use waav_telephony::core::transport::ServerMessage;

fn routing_rules(count: usize) -> Vec<RoutingRule> {
    let mut rules: Vec<RoutingRule> = (0..count)
        .map(|i| RoutingRule {
            name: format!("rule-{i}"),
            priority: i as i32,
            conditions: RuleConditions {
                time_window: Some(TimeWindowSpec {
                    start: "18:00".to_string(),
                    end: "08:00".to_string(),
                }),
                days_of_week: Some(vec!["sat".to_string(), "sun".to_string()]),
                caller_pattern: Some(format!(r"^\+1555{i:04}\d+$")),
                organization_number: None,
            },
            action: RouteAction {
                kind: RouteActionKind::Voicemail,
                target: None,
                message: None,
            },
        })
        .collect();
    rules.push(RoutingRule {
        name: "fallback".to_string(),
        priority: i32::MAX,
        conditions: RuleConditions::default(),
        action: RouteAction::agent(),
    });
    rules
}

/// Benchmark rule evaluation when only the last rule matches
fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");
    group.measurement_time(Duration::from_secs(5));

    let at = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).single().unwrap_or_default();
    for count in [1usize, 10, 50] {
        let router = Router::new(routing_rules(count), 0).unwrap();
        group.bench_with_input(BenchmarkId::new("route", count), &router, |b, router| {
            b.iter(|| {
                router.route(black_box(CallContext {
                    caller: "+15559990000",
                    organization_number: "+1 (555) 000-1111",
                    at,
                }))
            });
        });
    }

    group.finish();
}

/// Benchmark sentence chunking of long agent replies
fn bench_chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunking");

    let chunker = TextChunker::new(200);
    let paragraph = "Thanks for calling. Your order shipped yesterday and should arrive \
                     within three business days! Is there anything else I can help with? ";
    for repeat in [1usize, 10, 100] {
        let text = paragraph.repeat(repeat);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("split", text.len()), &text, |b, text| {
            b.iter(|| chunker.split(black_box(text)));
        });
    }

    group.finish();
}

/// Benchmark the inbound media path: mu-law decode then silence gating
fn bench_inbound_audio(c: &mut Criterion) {
    let mut group = c.benchmark_group("inbound_audio");

    let codec = MulawCodec;
    // 20ms at 8kHz
    let speech: Vec<u8> = (0..160u32).map(|i| (i * 7 % 256) as u8).collect();
    let silence = vec![0xFFu8; 160];

    group.throughput(Throughput::Bytes(speech.len() as u64));
    group.bench_function("decode_frame", |b| {
        b.iter(|| codec.decode(black_box(&speech)));
    });

    let samples = codec.decode(&speech).unwrap_or_default();
    let quiet = codec.decode(&silence).unwrap_or_default();
    let mut gate = SilenceGate::new(500.0, 5);
    group.bench_function("gate_speech", |b| {
        b.iter(|| gate.process(black_box(&samples)));
    });
    group.bench_function("gate_silence", |b| {
        b.iter(|| gate.process(black_box(&quiet)));
    });

    let pcm = vec![1200i16; 160];
    group.bench_function("encode_frame", |b| {
        b.iter(|| codec.encode(black_box(&pcm)));
    });

    group.finish();
}

/// Benchmark parsing of backend stream messages
fn bench_message_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_parsing");

    let transcript = r#"{"type":"customer_transcript","text":"I would like to check on my order","is_final":true,"language":"en","confidence":0.93}"#;
    let audio = format!(
        r#"{{"type":"agent_tts_audio","audio":"{}","chunk_index":3,"is_final":false}}"#,
        "A".repeat(4096)
    );

    for (name, msg) in [("transcript", transcript.to_string()), ("agent_audio", audio)] {
        group.throughput(Throughput::Bytes(msg.len() as u64));
        group.bench_with_input(BenchmarkId::new(name, msg.len()), &msg, |b, msg| {
            b.iter(|| {
                let _: Result<ServerMessage, _> = serde_json::from_str(black_box(msg));
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_routing,
    bench_chunking,
    bench_inbound_audio,
    bench_message_parsing
);
criterion_main!(benches);
