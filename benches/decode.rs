use chatwire::extract::{BodyFraming, FrameExtractor, StreamExtractor};
use chatwire::protocol::canonical::{ChatMessage, ChunkResult, SendOptions};
use chatwire::protocol::profile::{EndpointProfile, Framing, StreamSchema, UsagePaths};
use chatwire::request::{render_template, RenderingContext};
use chatwire::stream::FrameDecoder;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn sse_payload(events: usize) -> Vec<u8> {
    let mut out = String::new();
    for i in 0..events {
        out.push_str(&format!(
            "data: {{\"id\":\"chatcmpl\",\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"token-{i} \"}}}}]}}\n\n"
        ));
    }
    out.push_str("data: [DONE]\n\n");
    out.into_bytes()
}

fn ndjson_payload(lines: usize) -> Vec<u8> {
    let mut out = String::new();
    for i in 0..lines {
        out.push_str(&format!(
            "{{\"message\":{{\"content\":\"token-{i} \"}},\"done\":false}}\n"
        ));
    }
    out.push_str("{\"done\":true,\"done_reason\":\"stop\",\"eval_count\":42}\n");
    out.into_bytes()
}

fn decode_in_reads(framing: BodyFraming, payload: &[u8], read_size: usize) -> usize {
    let mut decoder = FrameDecoder::new(framing);
    let mut frames = Vec::new();
    for read in payload.chunks(read_size) {
        decoder.feed(read, &mut frames);
    }
    decoder.finish(&mut frames);
    frames.len()
}

fn bench_frame_decoding(c: &mut Criterion) {
    let sse = sse_payload(512);
    let ndjson = ndjson_payload(512);

    c.bench_function("decode_sse_512_events_read_1k", |b| {
        b.iter(|| black_box(decode_in_reads(BodyFraming::Sse, black_box(&sse), 1024)));
    });
    c.bench_function("decode_sse_512_events_read_7", |b| {
        b.iter(|| black_box(decode_in_reads(BodyFraming::Sse, black_box(&sse), 7)));
    });
    c.bench_function("decode_lines_512_read_1k", |b| {
        b.iter(|| black_box(decode_in_reads(BodyFraming::Lines, black_box(&ndjson), 1024)));
    });
}

fn bench_extraction(c: &mut Criterion) {
    let openai = FrameExtractor::OpenAiChat;
    let schema = FrameExtractor::Schema(
        StreamExtractor::compile(&StreamSchema {
            framing: Framing::Lines,
            path_delta: "message.content".into(),
            path_finish: Some("done_reason".into()),
            path_usage: Some(UsagePaths {
                completion_tokens: Some("eval_count".into()),
                ..UsagePaths::default()
            }),
        })
        .expect("schema compiles"),
    );

    let openai_frame =
        r#"{"id":"chatcmpl","choices":[{"index":0,"delta":{"content":"hello"},"finish_reason":null}]}"#;
    let ndjson_frame = r#"{"message":{"content":"hello"},"done":false}"#;

    c.bench_function("extract_openai_event", |b| {
        let mut out: Vec<ChunkResult> = Vec::with_capacity(4);
        b.iter(|| {
            out.clear();
            openai.extract_frame(black_box(openai_frame), &mut out);
            black_box(out.len())
        });
    });
    c.bench_function("extract_schema_ndjson", |b| {
        let mut out: Vec<ChunkResult> = Vec::with_capacity(4);
        b.iter(|| {
            out.clear();
            schema.extract_frame(black_box(ndjson_frame), &mut out);
            black_box(out.len())
        });
    });
}

fn bench_template_render(c: &mut Criterion) {
    let messages: Vec<ChatMessage> = (0..16)
        .map(|i| ChatMessage::user(format!("message number {i}")))
        .collect();
    let options = SendOptions {
        temperature: Some(0.2),
        ..SendOptions::default()
    };
    let profile = EndpointProfile::openai_chat("http://bench.local", "bench-model");
    let template = serde_json::json!({
        "model": "{{model}}",
        "messages": "{{messages[]}}",
        "stream": "{{stream}}",
        "options": {"temperature": "{{temperature}}", "tag": "run-{{model}}"}
    });

    c.bench_function("render_template_16_messages", |b| {
        b.iter(|| {
            let ctx = RenderingContext::new(&messages, &options, &profile, true);
            black_box(render_template(black_box(&template), &ctx))
        });
    });
}

criterion_group!(
    benches,
    bench_frame_decoding,
    bench_extraction,
    bench_template_render
);
criterion_main!(benches);
