#![no_main]

use libfuzzer_sys::fuzz_target;
use postgate_smtp::decode::{client_command, known_verb};
use postgate_smtp::encode::Encode;
use postgate_smtp::flow::State;
use postgate_smtp::types::Limits;
use tokio_util::bytes::BytesMut;

fuzz_target!(|data: &[u8]| {
    let limits = Limits::new(1024);
    let mut state = State::new();
    let mut out = BytesMut::new();

    // Every line is a command, the session must never panic and every
    // reply must be encodable
    for line in data.split(|c| *c == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let reply = match client_command(line) {
            Ok((_, cmd)) => state.progress(cmd, "fuzz.example", &limits),
            Err(_) => {
                let _ = known_verb(line);
                continue;
            }
        };
        reply.encode(&mut out).expect("reply must be encodable");
        if state.take_envelope().is_some() {
            assert!(!state.is_data());
        }
        if state.is_quit() {
            break;
        }
    }
});
