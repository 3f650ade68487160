use anyhow::Result;
use tokio_util::bytes::{BufMut, BytesMut};

use super::types::*;

pub trait Encode {
    fn encode(&self, out: &mut BytesMut) -> Result<()>;
}

fn crlf_enc(out: &mut BytesMut) {
    out.put(&b"\r\n"[..])
}

impl Encode for ReplyCode {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        if !(200..600).contains(&self.0) {
            anyhow::bail!("{} is not a valid SMTP reply code", self.0);
        }
        out.put(self.0.to_string().as_bytes());
        Ok(())
    }
}

impl Encode for Reply {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        // A reply always carries at least one line, even an empty one
        let last = self.lines.len().saturating_sub(1);
        let empty = [String::new()];
        let lines = match self.lines.is_empty() {
            true => &empty[..],
            false => &self.lines[..],
        };

        for (idx, line) in lines.iter().enumerate() {
            self.code.encode(out)?;
            match idx == last {
                true => out.put_u8(b' '),
                false => out.put_u8(b'-'),
            }
            // Never let a CR or LF from the text break the framing
            for c in line.bytes() {
                match c {
                    b'\r' | b'\n' => out.put_u8(b' '),
                    c => out.put_u8(c),
                }
            }
            crlf_enc(out);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(reply: Reply) -> String {
        let mut out = BytesMut::new();
        reply.encode(&mut out).unwrap();
        String::from_utf8(out.to_vec()).unwrap()
    }

    #[test]
    fn single_line() {
        assert_eq!(encoded(Reply::okay()), "250 2.0.0 OK\r\n");
    }

    #[test]
    fn multi_line() {
        let reply = Reply::multiline(
            ReplyCode::OKAY,
            vec!["mx.example.tld".into(), "PIPELINING".into(), "8BITMIME".into()],
        );
        assert_eq!(
            encoded(reply),
            "250-mx.example.tld\r\n250-PIPELINING\r\n250 8BITMIME\r\n"
        );
    }

    #[test]
    fn no_injection() {
        let reply = Reply::new(ReplyCode::TRANSACTION_FAILED, "e2: nope\r\n250 OK");
        assert_eq!(encoded(reply), "554 e2: nope  250 OK\r\n");
    }

    #[test]
    fn empty_reply() {
        let reply = Reply::multiline(ReplyCode::OKAY, vec![]);
        assert_eq!(encoded(reply), "250 \r\n");
    }

    #[test]
    fn invalid_code() {
        let mut out = BytesMut::new();
        assert!(Reply::new(ReplyCode(42), "nope").encode(&mut out).is_err());
    }
}
