pub mod decode;
pub mod encode;
pub mod flow;
/// Server side of the Simple Mail Transfer Protocol, as much as a relay needs
///
/// ## Trace
///
/// ```text
/// S: 220 mx.example.tld ESMTP Service Ready
/// C: EHLO client.example.com
/// S: 250-mx.example.tld
/// S: 250-PIPELINING
/// S: 250-SIZE 2097152
/// S: 250-8BITMIME
/// S: 250 ENHANCEDSTATUSCODES
/// C: MAIL FROM:<alice@example.com> SIZE=1024
/// S: 250 2.1.0 Originator <alice@example.com> ok
/// C: RCPT TO:<bob@example.org>
/// S: 250 2.1.5 Recipient <bob@example.org> ok
/// C: DATA
/// S: 354 Start mail input; end with <CRLF>.<CRLF>
/// C: Subject: Hi
/// C:
/// C: hello
/// C: .
/// S: 250 2.0.0 OK: queued
/// C: QUIT
/// S: 221 2.0.0 mx.example.tld Service closing transmission channel
/// ```
///
/// The DATA payload itself is not handled here: once the state machine
/// reaches [`flow::State::Data`], the network loop reads the message and
/// hands the envelope back with [`flow::State::take_envelope`].
///
/// ## RFC References
///
/// SMTP - https://datatracker.ietf.org/doc/html/rfc5321
/// SIZE extension - https://datatracker.ietf.org/doc/html/rfc1870
/// Enhanced status codes - https://datatracker.ietf.org/doc/html/rfc3463
pub mod types;
