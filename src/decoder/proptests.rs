//! Property-based tests for the stream decoder

use super::*;
use proptest::prelude::*;

fn arb_event_text() -> impl Strategy<Value = String> {
    // Mix of ASCII, accented and CJK text so splits land inside characters
    "[a-zA-Z0-9 éü你好,.!]{0,12}"
}

fn arb_line() -> impl Strategy<Value = String> {
    prop_oneof![
        6 => arb_event_text().prop_map(|text| {
            format!("data: {}", serde_json::json!({"choices": [{"delta": {"content": text}}]}))
        }),
        1 => Just(String::new()),
        1 => Just(": keep-alive".to_string()),
        1 => Just("data: {not json".to_string()),
    ]
}

fn arb_body() -> impl Strategy<Value = (Vec<u8>, bool)> {
    (proptest::collection::vec(arb_line(), 0..12), any::<bool>(), any::<bool>()).prop_map(
        |(lines, with_done, trailing_newline)| {
            let mut body = lines.join("\n");
            if with_done {
                body.push_str("\ndata: [DONE]\n");
                body.push_str(&lines.join("\n"));
            } else if trailing_newline {
                body.push('\n');
            }
            (body.into_bytes(), with_done)
        },
    )
}

fn decode_whole(body: &[u8]) -> Vec<String> {
    let mut decoder = SseDecoder::new(ChatCompletionDeltas);
    let mut out = decoder.feed(body);
    out.extend(decoder.finish());
    out
}

fn decode_split(body: &[u8], cuts: &[usize]) -> Vec<String> {
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (body.len() + 1)).collect();
    points.sort_unstable();

    let mut decoder = SseDecoder::new(ChatCompletionDeltas);
    let mut out = Vec::new();
    let mut start = 0;
    for point in points {
        out.extend(decoder.feed(&body[start..point]));
        start = point;
    }
    out.extend(decoder.feed(&body[start..]));
    out.extend(decoder.finish());
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Chunk boundaries never change the decoded delta sequence
    #[test]
    fn prop_chunking_is_invisible(
        (body, _) in arb_body(),
        cuts in proptest::collection::vec(any::<usize>(), 0..16),
    ) {
        prop_assert_eq!(decode_split(&body, &cuts), decode_whole(&body));
    }

    // Byte-at-a-time feeding matches single-chunk feeding
    #[test]
    fn prop_single_bytes_match_whole((body, _) in arb_body()) {
        let mut decoder = SseDecoder::new(ChatCompletionDeltas);
        let mut out = Vec::new();
        for byte in &body {
            out.extend(decoder.feed(std::slice::from_ref(byte)));
        }
        out.extend(decoder.finish());
        prop_assert_eq!(out, decode_whole(&body));
    }

    // No empty deltas, and nothing past the sentinel
    #[test]
    fn prop_deltas_non_empty_and_bounded((body, with_done) in arb_body()) {
        let deltas = decode_whole(&body);
        prop_assert!(deltas.iter().all(|d| !d.is_empty()));

        if with_done {
            let text = String::from_utf8(body).unwrap();
            let before_done = text.split("data: [DONE]").next().unwrap_or_default();
            let expected = decode_whole(before_done.as_bytes());
            prop_assert_eq!(deltas, expected);
        }
    }
}
